//! Daemon Server Implementation
//!
//! This module provides the accept loop for the face daemon:
//! - Accepts connections from whichever [`Acceptor`] was bound
//! - Spawns a read loop per connection
//! - Tracks active connections and enforces the connection limit
//! - Supports graceful shutdown
//!
//! # Multi-Connection Architecture
//!
//! Upstream components usually hold one connection each:
//!
//! ```text
//!     ASR pipeline    LLM pipeline    Emotion classifier
//!       (conn-1)        (conn-2)          (conn-3)
//!          │               │                 │
//!          └───────────────┼─────────────────┘
//!                          │
//!                    DaemonServer
//!                          │
//!                    SessionHandle
//!                          │
//!                 Conductor (one task)
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use dashmap::DashMap;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, error, info, warn, Instrument};

use face_conductor::transport::{
    serve_connection, Accepted, Acceptor, ConnectionId, ConnectionReader, TransportConfig,
    TransportError,
};
use face_conductor::SessionHandle;

/// Connection state tracking
#[derive(Debug)]
struct ConnectionState {
    /// When the connection was established
    connected_at: Instant,
    /// Remote peer as reported by the transport
    peer: String,
    /// Handle to abort the connection task
    abort_handle: tokio::task::AbortHandle,
}

/// Configuration for the daemon server
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Longest accepted line in bytes
    pub max_line_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&TransportConfig::default())
    }
}

impl From<&TransportConfig> for ServerConfig {
    fn from(config: &TransportConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            max_line_bytes: config.max_line_bytes,
        }
    }
}

/// Shared view of the active connections
#[derive(Clone, Debug, Default)]
pub struct ConnectionTable {
    inner: Arc<DashMap<ConnectionId, ConnectionState>>,
}

impl ConnectionTable {
    /// Get number of active connections
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no connection is active
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Get connection statistics
    #[must_use]
    pub fn stats(&self) -> HashMap<ConnectionId, ConnectionInfo> {
        self.inner
            .iter()
            .map(|r| {
                let state = r.value();
                (
                    r.key().clone(),
                    ConnectionInfo {
                        peer: state.peer.clone(),
                        uptime_secs: state.connected_at.elapsed().as_secs(),
                    },
                )
            })
            .collect()
    }
}

/// Statistics for a single connection
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Remote peer
    pub peer: String,
    /// Connection uptime in seconds
    pub uptime_secs: u64,
}

/// The main daemon server
pub struct DaemonServer {
    acceptor: Box<dyn Acceptor>,
    handle: SessionHandle,
    server_config: ServerConfig,
    connections: ConnectionTable,
    shutdown: Arc<Notify>,
}

impl DaemonServer {
    /// Create a new daemon server around a bound acceptor
    pub fn new(acceptor: Box<dyn Acceptor>, handle: SessionHandle, server_config: ServerConfig) -> Self {
        Self {
            acceptor,
            handle,
            server_config,
            connections: ConnectionTable::default(),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Notifier that stops [`DaemonServer::run`] when signalled
    pub fn shutdown_notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Active connection table
    pub fn connections(&self) -> ConnectionTable {
        self.connections.clone()
    }

    /// Where the server listens
    pub fn local_description(&self) -> String {
        self.acceptor.local_description()
    }

    /// Run the accept loop until shutdown is signalled
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be shut down cleanly.
    pub async fn run(&mut self) -> Result<()> {
        info!(listen = %self.acceptor.local_description(), "Ready to accept connections");

        loop {
            let accepted = tokio::select! {
                () = self.shutdown.notified() => {
                    info!("Shutdown requested, stopping accept loop");
                    break;
                }
                accepted = self.acceptor.accept() => accepted,
            };

            match accepted {
                Ok(accepted) => self.admit(accepted),
                Err(TransportError::InvalidState(reason)) => {
                    error!(%reason, "Listener unusable, stopping accept loop");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Accept failed");
                }
            }

            if self.handle.is_closed() {
                warn!("Session stopped, no longer accepting connections");
                break;
            }
        }

        // Graceful shutdown
        self.shutdown().await
    }

    /// Start serving an accepted connection, or reject it at the limit
    fn admit(&self, accepted: Accepted) {
        let Accepted {
            conn_id,
            peer,
            reader,
        } = accepted;

        if self.connections.len() >= self.server_config.max_connections {
            warn!(
                conn_id = %conn_id,
                peer = %peer,
                max_connections = self.server_config.max_connections,
                "Connection limit reached, rejecting new connection"
            );
            drop(reader);
            return;
        }

        info!(
            conn_id = %conn_id,
            peer = %peer,
            active_connections = self.connections.len() + 1,
            "New connection accepted"
        );

        // The handler waits until it is registered so it can always remove itself
        let (registered_tx, registered_rx) = oneshot::channel();
        let task_handle = tokio::spawn(
            Self::handle_connection(
                conn_id.clone(),
                reader,
                self.handle.clone(),
                self.server_config.max_line_bytes,
                self.connections.clone(),
                registered_rx,
            )
            .instrument(tracing::info_span!("connection", %conn_id)),
        );

        self.connections.inner.insert(
            conn_id,
            ConnectionState {
                connected_at: Instant::now(),
                peer,
                abort_handle: task_handle.abort_handle(),
            },
        );
        // Handler may already be aborted
        let _ = registered_tx.send(());
    }

    /// Handle a single upstream connection
    async fn handle_connection(
        conn_id: ConnectionId,
        reader: ConnectionReader,
        handle: SessionHandle,
        max_line_bytes: usize,
        connections: ConnectionTable,
        registered: oneshot::Receiver<()>,
    ) {
        if registered.await.is_err() {
            return;
        }
        debug!("Connection handler started");

        let stats = serve_connection(&conn_id, reader, &handle, max_line_bytes).await;
        connections.inner.remove(&conn_id);

        info!(
            end = ?stats.end,
            bytes_read = stats.bytes_read,
            oversized = stats.oversized,
            active_connections = connections.len(),
            "Connection handler finished"
        );
    }

    /// Graceful shutdown
    async fn shutdown(&mut self) -> Result<()> {
        info!("Initiating graceful shutdown");

        if self.connections.is_empty() {
            debug!("No active connections to abort");
        }

        // Abort all connection handlers
        for (conn_id, conn) in self.connections.stats() {
            if let Some((_, state)) = self.connections.inner.remove(&conn_id) {
                info!(
                    conn_id = %conn_id,
                    peer = %conn.peer,
                    uptime_secs = conn.uptime_secs,
                    "Aborting connection"
                );
                state.abort_handle.abort();
            }
        }

        self.acceptor.shutdown().await?;
        info!("Shutdown complete");
        Ok(())
    }
}
