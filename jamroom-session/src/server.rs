//! WebSocket transport for the room session coordinator.
//!
//! Architecture:
//! ```text
//! Performer A ──┐                                  ┌──► Listener L
//!               ├── SessionServer ── Coordinator ──┤
//! Performer B ──┘   (1 task per      (1 worker     └──► Listener M
//!                    connection)      per room)
//! ```
//!
//! Each connection is assigned a member id, gets a mailbox from the
//! coordinator and runs a `select!` loop between inbound frames and that
//! mailbox. Closing the socket is the `disconnect` event.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::coordinator::{RoomSessionCoordinator, SessionConfig};
use crate::error::SessionError;
use crate::protocol::{ClientEvent, ProtocolError};
use crate::sink::CompositionSink;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Coordinator and mixer settings
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            session: SessionConfig::default(),
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_frames: u64,
    pub total_bytes: u64,
    pub rejected_frames: u64,
}

#[derive(Default)]
struct AtomicServerStats {
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    total_frames: AtomicU64,
    total_bytes: AtomicU64,
    rejected_frames: AtomicU64,
}

/// The session server.
pub struct SessionServer {
    config: ServerConfig,
    coordinator: Arc<RoomSessionCoordinator>,
    stats: Arc<AtomicServerStats>,
}

impl SessionServer {
    /// Create a server. Fails if the mixer configuration is invalid.
    pub fn new(config: ServerConfig, sink: Arc<dyn CompositionSink>) -> Result<Self, SessionError> {
        let coordinator = RoomSessionCoordinator::new(config.session.clone(), sink)?;
        Ok(Self::with_coordinator(config, Arc::new(coordinator)))
    }

    /// Serve an existing coordinator.
    pub fn with_coordinator(config: ServerConfig, coordinator: Arc<RoomSessionCoordinator>) -> Self {
        Self {
            config,
            coordinator,
            stats: Arc::new(AtomicServerStats::default()),
        }
    }

    /// Start listening for WebSocket connections.
    ///
    /// This runs the server event loop. Call from an async runtime.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("Session server listening on {}", self.config.bind_addr);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let coordinator = self.coordinator.clone();
            let stats = self.stats.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, coordinator, stats).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        coordinator: Arc<RoomSessionCoordinator>,
        stats: Arc<AtomicServerStats>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        stats.total_connections.fetch_add(1, Ordering::Relaxed);
        stats.active_connections.fetch_add(1, Ordering::Relaxed);

        let member_id = Uuid::new_v4();
        let mut mailbox = coordinator.connect(member_id).await;
        log::info!("WebSocket connection established from {addr} as member {member_id}");

        let result: Result<(), Box<dyn std::error::Error + Send + Sync>> = async {
            loop {
                tokio::select! {
                    // Incoming WebSocket message
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Binary(data))) => {
                                stats.total_frames.fetch_add(1, Ordering::Relaxed);
                                stats.total_bytes.fetch_add(data.len() as u64, Ordering::Relaxed);
                                match ClientEvent::decode(&data) {
                                    Ok(event) => coordinator.handle(member_id, event).await,
                                    Err(e) => {
                                        stats.rejected_frames.fetch_add(1, Ordering::Relaxed);
                                        log::warn!("Failed to decode frame from {addr}: {e}");
                                    }
                                }
                            }

                            Some(Ok(Message::Close(_))) | None => {
                                log::info!("Connection closed from {addr}");
                                break;
                            }

                            Some(Ok(Message::Ping(data))) => {
                                ws_sender.send(Message::Pong(data)).await?;
                            }

                            Some(Err(e)) => {
                                log::error!("WebSocket error from {addr}: {e}");
                                break;
                            }

                            _ => {}
                        }
                    }

                    // Outgoing event for this member
                    event = mailbox.recv() => {
                        let Some(event) = event else {
                            return Err(Box::new(ProtocolError::ConnectionClosed) as _);
                        };
                        let encoded = event.encode()?;
                        ws_sender.send(Message::Binary(encoded.into())).await?;
                    }
                }
            }
            Ok(())
        }
        .await;

        coordinator.disconnect(member_id).await;
        stats.active_connections.fetch_sub(1, Ordering::Relaxed);
        log::info!("Member {member_id} disconnected");
        result
    }

    /// Get server statistics.
    pub fn stats(&self) -> ServerStats {
        ServerStats {
            total_connections: self.stats.total_connections.load(Ordering::Relaxed),
            active_connections: self.stats.active_connections.load(Ordering::Relaxed),
            total_frames: self.stats.total_frames.load(Ordering::Relaxed),
            total_bytes: self.stats.total_bytes.load(Ordering::Relaxed),
            rejected_frames: self.stats.rejected_frames.load(Ordering::Relaxed),
        }
    }

    /// Get the configured bind address.
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// Coordinator shared by every connection.
    pub fn coordinator(&self) -> &Arc<RoomSessionCoordinator> {
        &self.coordinator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:9090");
        assert_eq!(config.session.mixer.block_size, 1024);
        assert_eq!(config.session.mailbox_capacity, 256);
    }

    #[test]
    fn test_server_rejects_bad_mixer() {
        let mut config = ServerConfig::default();
        config.session.mixer.render_quantum = 300;
        assert!(SessionServer::new(config, Arc::new(MemorySink::new())).is_err());
    }

    #[tokio::test]
    async fn test_server_stats_initial() {
        let server = SessionServer::new(ServerConfig::default(), Arc::new(MemorySink::new())).unwrap();
        let stats = server.stats();
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.total_frames, 0);
        assert_eq!(stats.rejected_frames, 0);
        assert_eq!(server.bind_addr(), "127.0.0.1:9090");
        assert_eq!(server.coordinator().room_count().await, 0);
    }
}
