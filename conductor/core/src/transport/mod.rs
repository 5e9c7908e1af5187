//! Transport Layer for Upstream Commands
//!
//! Provides the listeners the upstream pipeline connects to:
//! - `Tcp`: the device's well-known port (default `127.0.0.1:8888`)
//! - `UnixSocket`: local-only IPC via a Unix domain socket
//!
//! # Design Philosophy
//!
//! Transports only move bytes. Each accepted connection gets its own read
//! loop ([`serve_connection`]) that frames and decodes lines, then forwards
//! typed messages to the single session task. A connection failing never
//! touches session state or other connections.
//!
//! # Security
//!
//! - Socket files are created with 0600 permissions
//! - TCP binds to loopback by default
//! - Clients are not authenticated

pub mod acceptor;
pub mod config;
pub mod connection;
pub mod error;

// Re-exports for convenience
pub use acceptor::{bind, Accepted, Acceptor, ConnectionReader, TcpAcceptor};
#[cfg(unix)]
pub use acceptor::UnixSocketAcceptor;
pub use config::{TransportConfig, TransportType, DEFAULT_MAX_CONNECTIONS, DEFAULT_TCP_ADDR};
#[cfg(unix)]
pub use config::default_socket_path;
pub use connection::{serve_connection, ConnectionEnd, ConnectionStats};
pub use error::{ConnectionId, TransportError};
