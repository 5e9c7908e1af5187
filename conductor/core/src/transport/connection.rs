//! Per-Connection Read Loop
//!
//! Frames one connection's bytes into lines, decodes each line and forwards
//! the result to the session. Bad input is logged and skipped; only a
//! transport failure or the session going away ends the loop.

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

use crate::conductor::SessionHandle;
use crate::protocol::{decode_line, LineDecoder, LineError};
use crate::transport::error::ConnectionId;

/// Read buffer size
const READ_BUFFER_BYTES: usize = 4096;

/// Why a read loop stopped
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionEnd {
    /// Peer closed the stream
    Eof,
    /// Reading failed
    ReadError(String),
    /// The session task is gone
    SessionClosed,
}

/// What happened on one connection
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    /// Raw bytes read
    pub bytes_read: u64,
    /// Non-empty lines framed
    pub lines: u64,
    /// Messages handed to the session
    pub dispatched: u64,
    /// Lines rejected as malformed (bad JSON, wrong field types, bad UTF-8)
    pub malformed: u64,
    /// Lines rejected for length
    pub oversized: u64,
    /// How the loop ended
    pub end: ConnectionEnd,
}

impl Default for ConnectionStats {
    fn default() -> Self {
        Self {
            bytes_read: 0,
            lines: 0,
            dispatched: 0,
            malformed: 0,
            oversized: 0,
            end: ConnectionEnd::Eof,
        }
    }
}

/// Serve one connection until it closes
pub async fn serve_connection<R>(
    conn_id: &ConnectionId,
    mut reader: R,
    handle: &SessionHandle,
    max_line_bytes: usize,
) -> ConnectionStats
where
    R: AsyncRead + Unpin,
{
    let mut decoder = LineDecoder::new(max_line_bytes);
    let mut stats = ConnectionStats::default();
    let mut buf = [0u8; READ_BUFFER_BYTES];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!(conn_id = %conn_id, "Connection closed by peer");
                // A last line without its newline still counts
                let tail = decoder.finish();
                if !forward(conn_id, tail, handle, &mut stats).await {
                    stats.end = ConnectionEnd::SessionClosed;
                }
                break;
            }
            Ok(n) => {
                stats.bytes_read += n as u64;
                decoder.push(&buf[..n]);
                if !drain(conn_id, &mut decoder, handle, &mut stats).await {
                    stats.end = ConnectionEnd::SessionClosed;
                    break;
                }
            }
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "Read error");
                stats.end = ConnectionEnd::ReadError(e.to_string());
                break;
            }
        }
    }

    info!(
        conn_id = %conn_id,
        lines = stats.lines,
        dispatched = stats.dispatched,
        malformed = stats.malformed,
        "Connection ended"
    );
    stats
}

/// Forward every complete line; false once the session is gone
async fn drain(
    conn_id: &ConnectionId,
    decoder: &mut LineDecoder,
    handle: &SessionHandle,
    stats: &mut ConnectionStats,
) -> bool {
    loop {
        let next = decoder.decode();
        if matches!(next, Ok(None)) {
            return true;
        }
        if !forward(conn_id, next, handle, stats).await {
            return false;
        }
    }
}

async fn forward(
    conn_id: &ConnectionId,
    framed: Result<Option<String>, LineError>,
    handle: &SessionHandle,
    stats: &mut ConnectionStats,
) -> bool {
    let line = match framed {
        Ok(Some(line)) => line,
        Ok(None) => return true,
        Err(LineError::TooLong { len, max }) => {
            stats.oversized += 1;
            warn!(conn_id = %conn_id, len, max, "Line too long, discarded");
            return true;
        }
        Err(e) => {
            stats.malformed += 1;
            warn!(conn_id = %conn_id, error = %e, "Undecodable line discarded");
            return true;
        }
    };

    stats.lines += 1;
    let message = match decode_line(&line) {
        Ok(message) => message,
        Err(e) => {
            stats.malformed += 1;
            warn!(conn_id = %conn_id, error = %e, "Malformed line discarded");
            return true;
        }
    };

    debug!(conn_id = %conn_id, kind = message.kind(), "Dispatching message");
    if handle.dispatch(message).await.is_err() {
        debug!(conn_id = %conn_id, "Session closed, ending connection");
        return false;
    }
    stats.dispatched += 1;
    true
}
