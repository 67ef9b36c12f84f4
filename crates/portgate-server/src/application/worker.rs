//! ConnectionWorker: the per-connection unit of work.
//!
//! A worker owns one [`Assignment`] (the accepted connection plus the
//! admission permit that let it in), performs a single bounded read, passes
//! the bytes to the [`PayloadHandler`], and then cleans up.
//!
//! # Cleanup guarantee
//!
//! On every exit path the socket is closed *before* the permit is returned,
//! so the number of open client sockets never exceeds the gate's capacity,
//! not just the number of busy workers.
//!
//! - Normal completion, read error, peer close, timeout and handler error all
//!   go through [`Assignment::finish`], which shuts the stream down, drops
//!   it, and then releases the permit.
//! - A panicking handler or a task that is cancelled before it ever runs
//!   drops the `Assignment` instead.  Struct fields drop in declaration order
//!   and `conn` is declared before `permit`, so the order holds there too.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use portgate_core::protocol::READ_BUFFER_SIZE;
use portgate_core::Payload;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::application::admission::Permit;
use crate::application::handler::PayloadHandler;
use crate::domain::{Connection, ConnectionId, ServerConfig};

/// Tunables for a worker's single read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Upper bound on the bytes delivered to the handler.
    pub read_buffer_size: usize,
    /// How long to wait for the client's message; `None` waits forever.
    pub read_timeout: Option<Duration>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            read_buffer_size: READ_BUFFER_SIZE,
            read_timeout: None,
        }
    }
}

impl From<&ServerConfig> for WorkerSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            read_buffer_size: config.read_buffer_size,
            read_timeout: config.read_timeout,
        }
    }
}

/// How a worker's connection ended.  None of these are escalated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The handler accepted this many bytes.
    Delivered(usize),
    /// The peer closed the connection before sending anything.
    PeerClosed,
    /// The read failed; the payload (if any) was not delivered.
    ReadFailed(io::ErrorKind),
    /// The handler returned an error for this many bytes.
    HandlerFailed(usize),
    /// No data arrived within the configured read timeout.
    TimedOut,
}

/// An accepted connection together with the permit that admitted it.
///
/// Field order is load-bearing: `conn` drops before `permit`.
#[derive(Debug)]
pub struct Assignment<S> {
    conn: Connection<S>,
    permit: Permit,
}

impl<S> Assignment<S> {
    pub fn new(conn: Connection<S>, permit: Permit) -> Self {
        Self { conn, permit }
    }

    pub fn id(&self) -> ConnectionId {
        self.conn.id()
    }

    pub fn peer(&self) -> std::net::SocketAddr {
        self.conn.peer()
    }
}

impl<S: AsyncWrite + Unpin> Assignment<S> {
    /// Closes the socket, then releases the permit.
    async fn finish(self) {
        let Assignment { conn, permit } = self;
        let id = conn.id();
        let mut stream = conn.into_stream();
        if let Err(e) = stream.shutdown().await {
            // The peer may already be gone; the descriptor is closed on drop
            // regardless.
            debug!("connection {id}: shutdown failed: {e}");
        }
        drop(stream);
        permit.release();
    }
}

/// Runs the single-read lifecycle for one connection at a time.
///
/// Cheap to clone; the listener clones one per spawned task.
#[derive(Clone)]
pub struct ConnectionWorker {
    handler: Arc<dyn PayloadHandler>,
    settings: WorkerSettings,
}

impl ConnectionWorker {
    pub fn new(handler: Arc<dyn PayloadHandler>, settings: WorkerSettings) -> Self {
        Self { handler, settings }
    }

    pub fn settings(&self) -> WorkerSettings {
        self.settings
    }

    /// Serves one connection and always cleans it up.
    ///
    /// Never returns an error: worker-local failures are logged and reported
    /// through the [`WorkerOutcome`].
    pub async fn run<S>(&self, mut assignment: Assignment<S>) -> WorkerOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let outcome = self.serve(&mut assignment.conn).await;
        assignment.finish().await;
        outcome
    }

    async fn serve<S>(&self, conn: &mut Connection<S>) -> WorkerOutcome
    where
        S: AsyncRead + Unpin,
    {
        let id = conn.id();
        let peer = conn.peer();
        let mut buf = vec![0u8; self.settings.read_buffer_size];

        let read = conn.stream_mut().read(&mut buf);
        let result = match self.settings.read_timeout {
            Some(limit) => match tokio::time::timeout(limit, read).await {
                Ok(result) => result,
                Err(_) => {
                    info!("connection {id}: no data from {peer} within {limit:?}; closing");
                    return WorkerOutcome::TimedOut;
                }
            },
            None => read.await,
        };

        match result {
            Ok(0) => {
                debug!("connection {id}: {peer} closed without sending data");
                WorkerOutcome::PeerClosed
            }
            Ok(n) => {
                let payload = Payload::from_slice(&buf[..n]);
                match self.handler.handle(peer, &payload) {
                    Ok(()) => WorkerOutcome::Delivered(n),
                    Err(e) => {
                        warn!("connection {id}: handler failed: {e}");
                        WorkerOutcome::HandlerFailed(n)
                    }
                }
            }
            Err(e) => {
                warn!("connection {id}: read from {peer} failed: {e}");
                WorkerOutcome::ReadFailed(e.kind())
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
