//! Application main loop.

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::query_cache::QueryCache;
use pulse_api::{RequestClient, DASHBOARD_QUERIES};
use pulse_core::CredentialSource;
use pulse_ws::{ConnectionState, EventStreamClient, StreamNotification};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

/// Main application.
///
/// Both clients share one credential source; the stream writes into the
/// query cache through the `CacheHandle` capability only.
pub struct Application {
    config: AppConfig,
    client: Arc<RequestClient>,
    cache: Arc<QueryCache>,
    stream: EventStreamClient,
}

impl Application {
    /// Create a new application backed by `reqwest`.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        let credentials: Arc<dyn CredentialSource> = Arc::new(config.auth.credentials());
        let client = Arc::new(RequestClient::new(
            config.api.client_config(),
            Arc::clone(&credentials),
        )?);
        Ok(Self::with_client(config, client, credentials))
    }

    /// Create an application around an existing request client.
    pub fn with_client(
        config: AppConfig,
        client: Arc<RequestClient>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        let cache = Arc::new(QueryCache::new());
        let stream = EventStreamClient::new(
            config.stream.stream_config(),
            cache.clone(),
            credentials,
        );
        Self {
            config,
            client,
            cache,
            stream,
        }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn client(&self) -> &Arc<RequestClient> {
        &self.client
    }

    pub fn stream(&self) -> &EventStreamClient {
        &self.stream
    }

    /// Refetch every dashboard query that is stale or not yet loaded, plus
    /// stale detail entries. Returns the number of entries refreshed.
    pub async fn refresh_stale(&self) -> usize {
        let mut keys: Vec<String> = DASHBOARD_QUERIES
            .iter()
            .map(|q| q.cache_key.to_string())
            .filter(|key| self.cache.is_stale(key))
            .collect();
        for key in self.cache.stale_keys() {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        let mut refreshed = 0;
        for key in keys {
            match self.cache.refresh(&key, &self.client).await {
                Ok(_) => refreshed += 1,
                Err(e) => warn!(%key, error = %e, "Failed to refresh dashboard query"),
            }
        }
        if refreshed > 0 {
            debug!(refreshed, "Dashboard queries refreshed");
        }
        refreshed
    }

    /// Write a summary of client metrics to the log.
    pub fn report(&self) {
        let stream = self.stream.metrics();
        info!(
            requests = self.client.metrics().len(),
            average_response_ms = self.client.average_response_time(),
            success_rate = self.client.success_rate(),
            in_flight = self.client.in_flight_count(),
            "Request client metrics"
        );
        info!(
            state = %self.stream.state(),
            received = stream.messages_received,
            sent = stream.messages_sent,
            reconnects = stream.reconnect_count,
            average_latency_ms = stream.average_latency_ms,
            uptime_ms = stream.uptime_ms,
            queued = self.stream.queued_len(),
            "Event stream metrics"
        );
    }

    /// Connect the stream unless it is already up or reconnecting by itself.
    async fn ensure_stream(&self) {
        if !matches!(
            self.stream.state(),
            ConnectionState::Disconnected | ConnectionState::Failed
        ) {
            return;
        }
        if let Err(e) = self.stream.connect().await {
            warn!(error = %e, "Event stream unavailable, relying on periodic refresh");
        }
    }

    async fn handle_notification(&self, notification: StreamNotification) {
        match notification {
            StreamNotification::StateChanged { from, to } => {
                debug!(%from, %to, "Stream state notification");
            }
            StreamNotification::Event(event) => {
                debug!(kind = %event.kind, request_id = %event.correlation_id, "Push notification");
                self.refresh_stale().await;
            }
            StreamNotification::Error(message) => {
                warn!(%message, "Event stream error");
            }
        }
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> AppResult<()> {
        info!(
            base_url = %self.config.api.base_url,
            stream_url = %self.config.stream.url,
            "Starting dashboard data loop"
        );

        let mut notifications = self.stream.subscribe();
        self.ensure_stream().await;
        self.refresh_stale().await;

        let refresh_period = self.config.dashboard.refresh_interval();
        let report_period = self.config.dashboard.report_interval();
        let mut refresh_interval = interval_at(Instant::now() + refresh_period, refresh_period);
        let mut report_interval = interval_at(Instant::now() + report_period, report_period);

        loop {
            tokio::select! {
                notification = notifications.recv() => match notification {
                    Ok(notification) => self.handle_notification(notification).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Notification receiver lagged");
                    }
                    Err(RecvError::Closed) => break,
                },

                _ = refresh_interval.tick() => {
                    self.ensure_stream().await;
                    self.refresh_stale().await;
                }

                _ = report_interval.tick() => {
                    self.report();
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Disconnect the stream and abort outstanding requests.
    pub async fn shutdown(&self) {
        self.stream.disconnect().await;
        let cancelled = self.client.cancel_all_requests();
        self.report();
        info!(cancelled, "Shutdown complete");
    }
}
