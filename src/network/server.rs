//! WebSocket Session Server
//!
//! Accept loop and per-connection tasks. Each accepted connection is given a
//! fresh `ParticipantId` for its lifetime, a writer task draining the
//! coordinator's outbound channel into the socket, and a read loop mapping
//! wire messages onto coordinator events. A dropped socket is the disconnect
//! event; there is no reconnection, so the identity dies with the
//! connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::game::session::ParticipantId;
use crate::network::coordinator::Coordinator;
use crate::network::protocol::{ClientMessage, RejectCode};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            max_connections: 1000,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, falling back to defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("TURNSTONE_BIND")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bind_addr),
            max_connections: std::env::var("TURNSTONE_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            version: defaults.version,
        }
    }
}

/// Transport-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// The session server.
pub struct SessionServer {
    /// Server configuration.
    config: ServerConfig,
    /// Shared coordinator all connections feed into.
    coordinator: Arc<Coordinator>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl SessionServer {
    /// Create a server around an existing coordinator.
    pub fn new(config: ServerConfig, coordinator: Arc<Coordinator>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            coordinator,
            shutdown_tx,
        }
    }

    /// Bind the configured address and run the accept loop until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!(
            "Session server v{} listening on {}",
            self.config.version,
            listener.local_addr()?
        );
        self.run_with_listener(listener).await
    }

    /// Accept connections from an already-bound listener until shutdown.
    ///
    /// Callers that bind to an ephemeral port themselves can learn the
    /// address before handing the listener over.
    pub async fn run_with_listener(&self, listener: TcpListener) -> Result<(), ServerError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let connected = self.coordinator.connection_count().await;
                            if connected >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Signal the accept loop and all connection tasks to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Number of attached connections.
    pub async fn connection_count(&self) -> usize {
        self.coordinator.connection_count().await
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.coordinator.session_count().await
    }

    /// Number of queued participants.
    pub async fn queue_len(&self) -> usize {
        self.coordinator.queue_len().await
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let coordinator = Arc::clone(&self.coordinator);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let participant = ParticipantId::generate();
            info!(
                "Connection {} attached as participant {}",
                addr,
                hex::encode(&participant.0[..4])
            );

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let mut outbox_rx = coordinator.attach(participant).await;

            // Writer task: everything the coordinator queues for this
            // participant goes out here, in queue order.
            let writer_task = tokio::spawn(async move {
                while let Some(msg) = outbox_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            // Read loop.
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                Self::handle_client_message(participant, &text, &coordinator).await;
                            }
                            Some(Ok(Message::Binary(_))) => {
                                coordinator
                                    .reject(participant, RejectCode::Malformed, "binary frames are not supported")
                                    .await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Connection {} closed", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            // Removing the outbox closes the writer's channel once drained,
            // so queued notices still reach the socket before it dies.
            coordinator.on_disconnect(participant).await;
            let _ = writer_task.await;

            info!(
                "Connection {} ({}) cleaned up",
                addr,
                hex::encode(&participant.0[..4])
            );
        });
    }

    /// Map one inbound frame onto a coordinator event.
    async fn handle_client_message(
        participant: ParticipantId,
        text: &str,
        coordinator: &Arc<Coordinator>,
    ) {
        let msg = match ClientMessage::from_json(text) {
            Ok(m) => m,
            Err(e) => {
                debug!(
                    "Invalid message from {}: {}",
                    hex::encode(&participant.0[..4]),
                    e
                );
                coordinator
                    .reject(participant, RejectCode::Malformed, "unparseable message")
                    .await;
                return;
            }
        };

        match msg {
            ClientMessage::Join(req) => {
                coordinator
                    .on_join(participant, req.control(), Instant::now())
                    .await;
            }
            ClientMessage::Action(req) => match req.session_id_bytes() {
                Some(session_id) => {
                    coordinator
                        .on_action(participant, session_id, &req.action, Instant::now())
                        .await;
                }
                None => {
                    coordinator
                        .reject(participant, RejectCode::Malformed, "session id is not 16 hex bytes")
                        .await;
                }
            },
            ClientMessage::CancelJoin => {
                coordinator.on_cancel(participant).await;
            }
            ClientMessage::Ping { timestamp } => {
                coordinator.pong(participant, timestamp).await;
            }
        }
    }
}
