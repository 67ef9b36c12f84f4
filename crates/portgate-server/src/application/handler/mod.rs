//! What a worker does with the bytes it read.
//!
//! The server has no application protocol, so the only built-in handler is
//! [`LogHandler`], which reports each message in the log.  Embedders plug in
//! their own behaviour by implementing [`PayloadHandler`].
//!
//! # Testability
//!
//! [`mock::RecordingHandler`] records every payload and can be told to fail
//! or panic, which lets tests exercise the worker's cleanup paths.

use std::net::SocketAddr;

use portgate_core::Payload;
use thiserror::Error;
use tracing::{debug, info};

pub mod mock;

/// Failure reported by a handler.  Local to one connection.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("payload from {peer} rejected: {reason}")]
    Rejected { peer: SocketAddr, reason: String },

    #[error("handler I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Consumes the payload of one connection.
///
/// Called at most once per connection, from the connection's worker task.
/// Implementations must not block for long: the admission slot stays taken
/// until the handler returns.
pub trait PayloadHandler: Send + Sync + 'static {
    /// Handles the bytes delivered by the worker's single read.
    fn handle(&self, peer: SocketAddr, payload: &Payload) -> Result<(), HandlerError>;
}

/// Reference handler: logs the peer and the message text.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogHandler;

impl PayloadHandler for LogHandler {
    fn handle(&self, peer: SocketAddr, payload: &Payload) -> Result<(), HandlerError> {
        info!("CLIENT# {} (from {peer}, {} bytes)", payload.text(), payload.len());
        debug!("payload from {peer}: {}", payload.hex_dump());
        Ok(())
    }
}
