//! Shared test fixtures.

/// Re-check `$cond` every 20ms until it holds or 5s pass.
macro_rules! eventually {
    ($cond:expr) => {{
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            if $cond {
                break true;
            }
            if tokio::time::Instant::now() >= deadline {
                break false;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    }};
}

pub mod mock_ws;
