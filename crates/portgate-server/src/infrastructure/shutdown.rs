//! Process-wide teardown and the shutdown signal.
//!
//! [`ServerState`] bundles the resources the process owns for its whole life:
//! the listening socket, the admission gate and the pid-file lock.  It is
//! built up step by step during startup, so every field is optional.
//!
//! [`ShutdownHook`] takes ownership of the state at registration and tears it
//! down exactly once: either when [`ShutdownHook::fire`] is called or when the
//! hook is dropped, whichever comes first.  Teardown closes the gate and the
//! listening socket; it does not touch running workers, which each own their
//! socket and finish on their own.
//!
//! [`ShutdownTrigger`] / [`ShutdownSignal`] carry the request to stop from the
//! signal task to the accept loop, which checks it between accepts.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::application::admission::AdmissionLimiter;
use crate::infrastructure::singleton::LockHandle;

/// Resources owned by the running server.
#[derive(Debug, Default)]
pub struct ServerState {
    listener: Option<TcpListener>,
    limiter: Option<AdmissionLimiter>,
    lock: Option<LockHandle>,
}

impl ServerState {
    /// An empty state; nothing has been initialised yet.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lock(mut self, lock: LockHandle) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn with_limiter(mut self, limiter: AdmissionLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_listener(mut self, listener: TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn listener(&self) -> Option<&TcpListener> {
        self.listener.as_ref()
    }

    pub fn limiter(&self) -> Option<&AdmissionLimiter> {
        self.limiter.as_ref()
    }

    pub fn lock(&self) -> Option<&LockHandle> {
        self.lock.as_ref()
    }
}

/// One-shot teardown of a [`ServerState`].
#[derive(Debug)]
pub struct ShutdownHook {
    state: ServerState,
    fired: bool,
}

impl ShutdownHook {
    /// Takes ownership of `state`; teardown runs at the latest when the hook
    /// is dropped.
    pub fn register(state: ServerState) -> Self {
        Self {
            state,
            fired: false,
        }
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Adds the admission gate after registration.  Ignored once fired.
    pub fn attach_limiter(&mut self, limiter: AdmissionLimiter) {
        if self.fired {
            limiter.close();
            return;
        }
        self.state.limiter = Some(limiter);
    }

    /// Adds the listening socket after registration.  Ignored once fired.
    pub fn attach_listener(&mut self, listener: TcpListener) {
        if !self.fired {
            self.state.listener = Some(listener);
        }
    }

    pub fn is_fired(&self) -> bool {
        self.fired
    }

    /// Closes the admission gate and the listening socket.
    ///
    /// Returns `true` the first time and `false` on every later call.  Missing
    /// resources are skipped.  The pid-file lock stays held until the hook is
    /// dropped, so a replacement server cannot start while this one is still
    /// winding down.
    pub fn fire(&mut self) -> bool {
        if self.fired {
            return false;
        }
        self.fired = true;

        if let Some(limiter) = self.state.limiter.take() {
            limiter.close();
            debug!("admission gate closed ({})", limiter.snapshot());
        }
        if let Some(listener) = self.state.listener.take() {
            match listener.local_addr() {
                Ok(addr) => info!("closing listening socket {addr}"),
                Err(_) => info!("closing listening socket"),
            }
            drop(listener);
        }
        true
    }
}

impl Drop for ShutdownHook {
    fn drop(&mut self) {
        self.fire();
    }
}

/// Sending side of the shutdown request.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownTrigger {
    /// Requests shutdown.  Idempotent.
    pub fn fire(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// A new receiver for the same request.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving side of the shutdown request.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested.
    ///
    /// If every trigger is dropped without firing, no request can ever
    /// arrive and this never resolves.
    pub async fn triggered(&mut self) {
        if self.rx.wait_for(|&requested| requested).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Creates a connected trigger/signal pair.
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx: Arc::new(tx) }, ShutdownSignal { rx })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
