//! # portgate-send
//!
//! One-shot client for portgate: connect, write one NUL-terminated message
//! in a single write, close.
//!
//! The server performs exactly one read per connection, so the message must
//! leave in one piece.  A write that the kernel accepts only partially is
//! reported as [`SendError::ShortWrite`] rather than completed with a second
//! write.

use std::io;

use portgate_core::encode_message;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Why a message did not reach the server intact.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("cannot connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("send failed: {0}")]
    Io(#[from] io::Error),

    #[error("short write: sent {sent} of {expected} bytes")]
    ShortWrite { sent: usize, expected: usize },
}

/// Opens a TCP connection to `host:port`.  `host` may be an IP address or a
/// name; every resolved address is tried in turn.
pub async fn connect_to(host: &str, port: u16) -> io::Result<TcpStream> {
    TcpStream::connect((host, port)).await
}

/// Writes `text` plus its NUL terminator with a single write.
///
/// Returns the number of bytes sent, which is `text.len() + 1` on success.
///
/// # Errors
///
/// [`SendError::Io`] if the write fails and [`SendError::ShortWrite`] if only
/// part of the message was accepted.
pub async fn send_message<W>(stream: &mut W, text: &str) -> Result<usize, SendError>
where
    W: AsyncWrite + Unpin,
{
    let wire = encode_message(text);
    let sent = stream.write(&wire).await?;
    if sent != wire.len() {
        return Err(SendError::ShortWrite {
            sent,
            expected: wire.len(),
        });
    }
    stream.flush().await?;
    debug!("sent {sent} bytes");
    Ok(sent)
}

/// Connects, sends `text`, and closes the connection.
///
/// # Errors
///
/// Any [`SendError`].
pub async fn send_once(host: &str, port: u16, text: &str) -> Result<usize, SendError> {
    let mut stream = connect_to(host, port)
        .await
        .map_err(|source| SendError::Connect {
            host: host.to_string(),
            port,
            source,
        })?;
    let sent = send_message(&mut stream, text).await?;
    if let Err(e) = stream.shutdown().await {
        debug!("shutdown after send failed: {e}");
    }
    Ok(sent)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
