//! Transport errors and connection identity

use std::fmt;

use thiserror::Error;

/// Errors from binding or accepting on a listener
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not bind the listen address
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address or socket path
        addr: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Operation not valid in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Unique identifier for an accepted connection
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Generate a new identifier
    #[must_use]
    pub fn new() -> Self {
        Self(format!("conn-{}", uuid::Uuid::new_v4()))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
