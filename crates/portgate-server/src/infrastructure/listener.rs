//! ListenerLoop: the admission-controlled accept loop.
//!
//! ```text
//! Starting ─► Listening ─► AwaitingSlot ─► Accepting ─► Dispatching ─┐
//!                 ▲                                                   │
//!                 └───────────────────────────────────────────────────┘
//!   (shutdown requested, gate closed, or fatal accept error) ─► Stopped
//! ```
//!
//! 1. **AwaitingSlot** – acquire a permit from the [`AdmissionLimiter`].  This
//!    is the only place the loop waits for capacity: while every slot is busy
//!    accept is not called at all and the kernel backlog holds new clients.
//! 2. **Accepting** – block on `accept()`.  Transient failures are retried
//!    with the same permit; fatal ones stop the loop.
//! 3. **Dispatching** – move the connection and the permit into a new worker
//!    task and go back to step 1 without waiting for it.
//!
//! The shutdown signal is raced against both suspension points, so a stop
//! request is noticed between accepts without interrupting any worker.
//!
//! The loop is generic over [`Acceptor`]: production passes the
//! [`TcpListener`](tokio::net::TcpListener) returned by `listen_on`.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::application::admission::{AdmissionLimiter, LimiterError};
use crate::application::worker::{Assignment, ConnectionWorker};
use crate::domain::Connection;
use crate::infrastructure::acceptor::Acceptor;
use crate::infrastructure::error::ServerError;
use crate::infrastructure::shutdown::ShutdownSignal;

/// Pause before retrying accept after the process ran out of descriptors or
/// memory, so the loop does not spin while workers free resources.
const RESOURCE_BACKOFF: Duration = Duration::from_millis(100);

/// Where the accept loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Starting,
    Listening,
    AwaitingSlot,
    Accepting,
    Dispatching,
    Stopped,
}

/// Why the accept loop returned without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// A shutdown request was observed.
    Shutdown,
    /// The admission gate was closed underneath the loop.
    GateClosed,
}

/// How to react to a failed `accept()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptErrorKind {
    /// Retry immediately: the call was interrupted, or the failure belongs to
    /// one pending client rather than to the listening socket.
    Transient,
    /// Retry after [`RESOURCE_BACKOFF`] (out of descriptors, buffers or memory).
    ResourceExhausted,
    /// The listening socket is unusable; stop the loop.
    Fatal,
}

/// Classifies an accept failure.
pub fn classify_accept_error(err: &io::Error) -> AcceptErrorKind {
    match err.kind() {
        io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::TimedOut => return AcceptErrorKind::Transient,
        io::ErrorKind::OutOfMemory => return AcceptErrorKind::ResourceExhausted,
        _ => {}
    }

    #[cfg(unix)]
    if let Some(code) = err.raw_os_error() {
        if is_resource_errno(code) {
            return AcceptErrorKind::ResourceExhausted;
        }
        if is_pending_socket_errno(code) {
            return AcceptErrorKind::Transient;
        }
    }

    AcceptErrorKind::Fatal
}

#[cfg(unix)]
fn is_resource_errno(code: i32) -> bool {
    [libc::EMFILE, libc::ENFILE, libc::ENOBUFS, libc::ENOMEM].contains(&code)
}

/// Errors Linux reports through accept() for a connection that failed while
/// it sat in the queue, plus EPERM from a firewall rejecting it.  The
/// listening socket itself is fine.
#[cfg(unix)]
fn is_pending_socket_errno(code: i32) -> bool {
    let portable = [
        libc::EPROTO,
        libc::ENETDOWN,
        libc::ENETUNREACH,
        libc::EHOSTDOWN,
        libc::EHOSTUNREACH,
        libc::ENOPROTOOPT,
        libc::EOPNOTSUPP,
        libc::EPERM,
    ];
    #[cfg(any(target_os = "linux", target_os = "android"))]
    if code == libc::ENONET {
        return true;
    }
    portable.contains(&code)
}

/// The accept loop.  One per listening socket.
pub struct ListenerLoop {
    worker: ConnectionWorker,
    limiter: AdmissionLimiter,
    state_tx: watch::Sender<ListenerState>,
}

impl ListenerLoop {
    pub fn new(worker: ConnectionWorker, limiter: AdmissionLimiter) -> Self {
        let (state_tx, _) = watch::channel(ListenerState::Starting);
        Self {
            worker,
            limiter,
            state_tx,
        }
    }

    /// Watches state transitions (mainly for tests and diagnostics).
    pub fn subscribe_state(&self) -> watch::Receiver<ListenerState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> ListenerState {
        *self.state_tx.borrow()
    }

    pub fn limiter(&self) -> &AdmissionLimiter {
        &self.limiter
    }

    /// Runs until shutdown is requested, the gate is closed, or accept fails
    /// fatally.  Workers already dispatched keep running after it returns.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::FatalAccept`] when the listening socket becomes
    /// unusable.
    pub async fn run<A: Acceptor>(
        &self,
        listener: &A,
        mut shutdown: ShutdownSignal,
    ) -> Result<LoopExit, ServerError> {
        match listener.local_addr() {
            Ok(addr) => info!(
                "accepting connections on {addr} (capacity {})",
                self.limiter.maximum()
            ),
            Err(_) => info!("accepting connections (capacity {})", self.limiter.maximum()),
        }

        let exit = self.accept_loop(listener, &mut shutdown).await;
        self.set_state(ListenerState::Stopped);
        match &exit {
            Ok(LoopExit::Shutdown) => info!("accept loop stopped: shutdown requested"),
            Ok(LoopExit::GateClosed) => info!("accept loop stopped: admission gate closed"),
            Err(e) => error!("accept loop stopped: {e}"),
        }
        exit
    }

    async fn accept_loop<A: Acceptor>(
        &self,
        listener: &A,
        shutdown: &mut ShutdownSignal,
    ) -> Result<LoopExit, ServerError> {
        loop {
            self.set_state(ListenerState::Listening);

            self.set_state(ListenerState::AwaitingSlot);
            let permit = tokio::select! {
                biased;
                _ = shutdown.triggered() => return Ok(LoopExit::Shutdown),
                acquired = self.limiter.acquire() => match acquired {
                    Ok(permit) => permit,
                    Err(LimiterError::Closed) => return Ok(LoopExit::GateClosed),
                    Err(e) => return Err(e.into()),
                },
            };

            self.set_state(ListenerState::Accepting);
            // On every early return the permit is dropped here, unused.
            let Some((stream, peer)) = self.accept(listener, shutdown).await? else {
                return Ok(LoopExit::Shutdown);
            };

            self.set_state(ListenerState::Dispatching);
            self.dispatch(Assignment::new(Connection::new(stream, peer), permit));
        }
    }

    /// Accepts one connection, retrying transient failures.
    ///
    /// `Ok(None)` means shutdown was requested while waiting.
    async fn accept<A: Acceptor>(
        &self,
        listener: &A,
        shutdown: &mut ShutdownSignal,
    ) -> Result<Option<(A::Stream, SocketAddr)>, ServerError> {
        loop {
            let result = tokio::select! {
                biased;
                _ = shutdown.triggered() => return Ok(None),
                result = listener.accept() => result,
            };

            let err = match result {
                Ok(accepted) => return Ok(Some(accepted)),
                Err(err) => err,
            };

            match classify_accept_error(&err) {
                AcceptErrorKind::Transient => {
                    debug!("transient accept error, retrying: {err}");
                }
                AcceptErrorKind::ResourceExhausted => {
                    warn!("accept failed ({err}); retrying in {RESOURCE_BACKOFF:?}");
                    tokio::select! {
                        biased;
                        _ = shutdown.triggered() => return Ok(None),
                        _ = tokio::time::sleep(RESOURCE_BACKOFF) => {}
                    }
                }
                AcceptErrorKind::Fatal => {
                    return Err(ServerError::FatalAccept { source: err });
                }
            }
        }
    }

    /// Hands the assignment to a detached worker task.
    ///
    /// The task owns the connection and the permit.  If it never runs (the
    /// runtime is shutting down) or panics, dropping the assignment closes
    /// the socket and then returns the permit, so this path cannot leak
    /// either.
    fn dispatch<S>(&self, assignment: Assignment<S>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let id = assignment.id();
        let peer = assignment.peer();
        info!(
            "client connect from {} (connection {id}, port {})",
            peer.ip(),
            peer.port()
        );
        debug!("{}", self.limiter.snapshot());

        let worker = self.worker.clone();
        tokio::spawn(async move {
            let outcome = worker.run(assignment).await;
            debug!("connection {id}: worker finished: {outcome:?}");
        });
    }

    fn set_state(&self, state: ListenerState) {
        trace!("listener state → {state:?}");
        self.state_tx.send_replace(state);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
//
// End-to-end behaviour with real clients lives in `tests/listener_integration.rs`.
