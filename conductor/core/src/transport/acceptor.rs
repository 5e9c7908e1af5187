//! Listeners
//!
//! An [`Acceptor`] hands out inbound byte streams, one per connection. The
//! protocol is one-directional, so only the read side is kept.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;

use crate::transport::config::{TransportConfig, TransportType};
use crate::transport::error::{ConnectionId, TransportError};

/// Read half of an accepted connection
pub type ConnectionReader = Box<dyn AsyncRead + Send + Unpin>;

/// A freshly accepted connection
pub struct Accepted {
    /// Identifier used in logs
    pub conn_id: ConnectionId,
    /// Remote peer, as far as the transport knows it
    pub peer: String,
    /// Inbound bytes
    pub reader: ConnectionReader,
}

impl std::fmt::Debug for Accepted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accepted")
            .field("conn_id", &self.conn_id)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

/// Source of inbound connections
#[async_trait]
pub trait Acceptor: Send {
    /// Wait for the next connection
    async fn accept(&mut self) -> Result<Accepted, TransportError>;

    /// Where this acceptor listens
    fn local_description(&self) -> String;

    /// Stop listening and release resources
    async fn shutdown(&mut self) -> Result<(), TransportError>;
}

/// Bind the listener described by `config`
///
/// # Errors
///
/// Returns `TransportError::Bind` if the address or socket path cannot be
/// bound.
pub async fn bind(config: &TransportConfig) -> Result<Box<dyn Acceptor>, TransportError> {
    match &config.transport {
        TransportType::Tcp { addr } => Ok(Box::new(TcpAcceptor::bind(addr).await?)),
        #[cfg(unix)]
        TransportType::UnixSocket { path } => {
            let path = path
                .clone()
                .unwrap_or_else(crate::transport::config::default_socket_path);
            Ok(Box::new(UnixSocketAcceptor::bind(path)?))
        }
    }
}

// ============================================================================
// TCP
// ============================================================================

/// TCP listener
pub struct TcpAcceptor {
    listener: Option<TcpListener>,
    local: String,
}

impl TcpAcceptor {
    /// Bind `addr`
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Bind` if the address is unavailable.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local = listener
            .local_addr()
            .map_or_else(|_| addr.to_string(), |a| a.to_string());

        tracing::info!(addr = %local, "Face listening on TCP");
        Ok(Self {
            listener: Some(listener),
            local,
        })
    }

    /// Bound address (useful after binding port 0)
    #[must_use]
    pub fn local_addr(&self) -> &str {
        &self.local
    }
}

#[async_trait]
impl Acceptor for TcpAcceptor {
    async fn accept(&mut self) -> Result<Accepted, TransportError> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| TransportError::InvalidState("Not listening".to_string()))?;

        let (stream, peer) = listener.accept().await?;
        // Nothing is ever written back
        let (reader, _writer) = stream.into_split();

        Ok(Accepted {
            conn_id: ConnectionId::new(),
            peer: peer.to_string(),
            reader: Box::new(reader),
        })
    }

    fn local_description(&self) -> String {
        format!("tcp://{}", self.local)
    }

    async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.listener = None;
        tracing::info!("TCP listener shut down");
        Ok(())
    }
}

// ============================================================================
// Unix socket
// ============================================================================

/// Unix domain socket listener
///
/// The socket file is created with 0600 permissions and removed on shutdown
/// or drop.
#[cfg(unix)]
pub struct UnixSocketAcceptor {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
}

#[cfg(unix)]
impl UnixSocketAcceptor {
    /// Bind a socket at `socket_path`, replacing a stale socket file
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the directory, the stale file or the
    /// socket cannot be handled.
    pub fn bind(socket_path: PathBuf) -> Result<Self, TransportError> {
        // Create parent directories if needed
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TransportError::IoError(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create directory {}: {e}", parent.display()),
                ))
            })?;
        }

        // Remove existing socket file if present
        if socket_path.exists() {
            std::fs::remove_file(&socket_path).map_err(|e| {
                TransportError::IoError(std::io::Error::new(
                    e.kind(),
                    format!("Failed to remove old socket {}: {e}", socket_path.display()),
                ))
            })?;
        }

        let listener = UnixListener::bind(&socket_path).map_err(|source| TransportError::Bind {
            addr: socket_path.display().to_string(),
            source,
        })?;
        set_owner_only(&socket_path)?;

        tracing::info!(path = %socket_path.display(), "Face listening on Unix socket");
        Ok(Self {
            socket_path,
            listener: Some(listener),
        })
    }

    /// Get the socket path
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    fn remove_socket_file(&self) {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).ok();
        }
    }
}

/// Set socket permissions to 0600 (owner-only)
#[cfg(unix)]
fn set_owner_only(path: &Path) -> Result<(), TransportError> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(unix)]
#[async_trait]
impl Acceptor for UnixSocketAcceptor {
    async fn accept(&mut self) -> Result<Accepted, TransportError> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| TransportError::InvalidState("Not listening".to_string()))?;

        let (stream, _addr) = listener.accept().await?;
        let (reader, _writer) = stream.into_split();

        Ok(Accepted {
            conn_id: ConnectionId::new(),
            peer: self.socket_path.display().to_string(),
            reader: Box::new(reader),
        })
    }

    fn local_description(&self) -> String {
        format!("unix://{}", self.socket_path.display())
    }

    async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.listener = None;
        self.remove_socket_file();
        tracing::info!("Unix socket listener shut down");
        Ok(())
    }
}

#[cfg(unix)]
impl Drop for UnixSocketAcceptor {
    fn drop(&mut self) {
        self.remove_socket_file();
    }
}
