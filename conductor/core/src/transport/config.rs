//! Transport Configuration
//!
//! Selects where the face listens for upstream commands.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::protocol::DEFAULT_MAX_LINE_BYTES;

/// Default TCP listen address (the device's well-known port)
pub const DEFAULT_TCP_ADDR: &str = "127.0.0.1:8888";

/// Default cap on simultaneous connections
pub const DEFAULT_MAX_CONNECTIONS: usize = 100;

/// Transport type selection
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportType {
    /// TCP socket
    ///
    /// This is what the upstream speech pipeline connects to.
    Tcp {
        /// Listen address (e.g., "127.0.0.1:8888")
        addr: String,
    },

    /// Unix domain socket (local only)
    #[cfg(unix)]
    UnixSocket {
        /// Socket path (None = use default)
        ///
        /// Default: $XDG_RUNTIME_DIR/robot-face/face.sock
        /// Fallback: /tmp/robot-face-$UID/face.sock
        path: Option<PathBuf>,
    },
}

impl Default for TransportType {
    fn default() -> Self {
        Self::Tcp {
            addr: DEFAULT_TCP_ADDR.to_string(),
        }
    }
}

/// Transport configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Which transport to use
    pub transport: TransportType,

    /// Longest accepted line in bytes
    pub max_line_bytes: usize,

    /// Connections served at once; extra ones are closed on accept
    pub max_connections: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            transport: TransportType::default(),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl TransportConfig {
    /// Configuration for a TCP listener
    pub fn tcp(addr: impl Into<String>) -> Self {
        Self {
            transport: TransportType::Tcp { addr: addr.into() },
            ..Default::default()
        }
    }

    /// Configuration for a Unix socket listener
    #[cfg(unix)]
    #[must_use]
    pub fn unix(path: Option<PathBuf>) -> Self {
        Self {
            transport: TransportType::UnixSocket { path },
            ..Default::default()
        }
    }

    /// Check if this is a Unix socket configuration
    #[cfg(unix)]
    #[must_use]
    pub fn is_unix_socket(&self) -> bool {
        matches!(self.transport, TransportType::UnixSocket { .. })
    }

    /// Human-readable listen target
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.transport {
            TransportType::Tcp { addr } => format!("tcp://{addr}"),
            #[cfg(unix)]
            TransportType::UnixSocket { path } => {
                let path = path.clone().unwrap_or_else(default_socket_path);
                format!("unix://{}", path.display())
            }
        }
    }
}

/// Get the default Unix socket path
///
/// Uses XDG_RUNTIME_DIR if available, otherwise /tmp/robot-face-$UID/
#[cfg(unix)]
pub fn default_socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir)
            .join("robot-face")
            .join("face.sock")
    } else {
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/tmp/robot-face-{uid}/face.sock"))
    }
}
