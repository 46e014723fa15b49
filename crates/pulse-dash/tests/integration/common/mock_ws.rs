//! Mock event-stream server for integration tests.
//!
//! Provides a WebSocket server that can:
//! - Accept or refuse connections
//! - Record handshake query strings and received frames
//! - Push frames, close with any code, or drop the socket without a close frame

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};

enum Command {
    Push(String),
    Close(u16, String),
    Drop,
}

#[derive(Default)]
struct ServerState {
    messages: Mutex<Vec<String>>,
    queries: Mutex<Vec<String>>,
    connections: Mutex<u32>,
    refused: Mutex<u32>,
    client_closes: Mutex<u32>,
    refuse: AtomicBool,
    control: Mutex<Option<mpsc::UnboundedSender<Command>>>,
}

/// A mock event-stream server for testing.
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    state: Arc<ServerState>,
}

impl MockWsServer {
    /// Start a new mock server on an available port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ServerState::default());
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let state_clone = state.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(stream, state_clone.clone()));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            state,
        }
    }

    /// Get the server's stream URL.
    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Completed WebSocket handshakes.
    pub async fn connection_count(&self) -> u32 {
        *self.state.connections.lock().await
    }

    /// Connections dropped while refusing.
    pub async fn refused_count(&self) -> u32 {
        *self.state.refused.lock().await
    }

    /// Close frames received from clients.
    pub async fn client_close_count(&self) -> u32 {
        *self.state.client_closes.lock().await
    }

    /// Text frames received, in order.
    pub async fn received_messages(&self) -> Vec<String> {
        self.state.messages.lock().await.clone()
    }

    /// `type` of every received frame, in order.
    pub async fn received_types(&self) -> Vec<String> {
        self.received_messages()
            .await
            .iter()
            .filter_map(|text| serde_json::from_str::<Value>(text).ok())
            .filter_map(|v| v.get("type").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    /// Query string of each handshake.
    pub async fn handshake_queries(&self) -> Vec<String> {
        self.state.queries.lock().await.clone()
    }

    /// Drop new connections before the handshake.
    pub fn set_refuse(&self, refuse: bool) {
        self.state.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Push a raw text frame to the latest connection.
    pub async fn push(&self, text: impl Into<String>) {
        self.command(Command::Push(text.into())).await;
    }

    /// Push a well-formed event frame.
    pub async fn push_event(&self, kind: &str, request_id: &str, data: Value) {
        let frame = json!({
            "type": kind,
            "data": data,
            "timestamp": Utc::now().to_rfc3339(),
            "requestId": request_id,
            "version": "1.0"
        });
        self.push(frame.to_string()).await;
    }

    /// Send a close frame with `code`.
    pub async fn close(&self, code: u16) {
        self.command(Command::Close(code, "server close".to_string()))
            .await;
    }

    /// Drop the socket without a close frame.
    pub async fn drop_connection(&self) {
        self.command(Command::Drop).await;
    }

    async fn command(&self, command: Command) {
        if let Some(tx) = self.state.control.lock().await.as_ref() {
            let _ = tx.send(command);
        }
    }

    /// Shutdown the server.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(stream: TcpStream, state: Arc<ServerState>) {
    if state.refuse.load(Ordering::SeqCst) {
        *state.refused.lock().await += 1;
        drop(stream);
        return;
    }

    let mut query = None;
    let record_query = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        query = req.uri().query().map(str::to_string);
        Ok(resp)
    };
    let ws_stream = match accept_hdr_async(stream, record_query).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    state.queries.lock().await.push(query.unwrap_or_default());
    *state.connections.lock().await += 1;
    let (control_tx, mut control_rx) = mpsc::unbounded_channel();
    *state.control.lock().await = Some(control_tx);

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    state.messages.lock().await.push(text);
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) => {
                    *state.client_closes.lock().await += 1;
                    break;
                }
                Some(Err(_)) | None => break,
                _ => {}
            },
            command = control_rx.recv() => match command {
                Some(Command::Push(text)) => {
                    let _ = write.send(Message::Text(text)).await;
                }
                Some(Command::Close(code, reason)) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    let _ = write.send(Message::Close(Some(frame))).await;
                }
                Some(Command::Drop) | None => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockWsServer::start().await;
        assert!(server.url().starts_with("ws://127.0.0.1:"));
        server.shutdown().await;
    }
}
