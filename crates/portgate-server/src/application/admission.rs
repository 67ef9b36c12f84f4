//! AdmissionLimiter: the capacity gate in front of the accept call.
//!
//! The listener acquires a [`Permit`] *before* it accepts a connection and
//! moves the permit into the worker together with the socket.  When all
//! permits are out the listener simply stops accepting; pending clients wait
//! in the kernel's listen backlog instead of piling up as tasks.
//!
//! # Release discipline
//!
//! There is no `release()` method on the gate.  A permit is returned exactly
//! once, when the [`Permit`] value is dropped.  Ownership makes a double
//! release or a release without an acquire impossible, and unwinding after a
//! panic drops the permit like any other local.

use std::sync::Arc;

use portgate_core::GateSnapshot;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Errors returned by the admission gate.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LimiterError {
    /// A gate with no permits would never admit a connection.
    #[error("admission capacity must be at least 1")]
    ZeroCapacity,

    /// The requested capacity exceeds what the semaphore can represent.
    #[error("admission capacity {requested} exceeds the limit of {limit}")]
    TooLarge { requested: usize, limit: usize },

    /// The gate was closed during shutdown.
    #[error("admission gate is closed")]
    Closed,
}

/// Counting gate bounding the number of simultaneously active workers.
///
/// Cloning is cheap and every clone refers to the same gate.
#[derive(Debug, Clone)]
pub struct AdmissionLimiter {
    semaphore: Arc<Semaphore>,
    maximum: usize,
}

impl AdmissionLimiter {
    /// Creates a gate with `maximum` permits.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::ZeroCapacity`] for 0 and
    /// [`LimiterError::TooLarge`] above [`Semaphore::MAX_PERMITS`].
    pub fn new(maximum: usize) -> Result<Self, LimiterError> {
        if maximum == 0 {
            return Err(LimiterError::ZeroCapacity);
        }
        if maximum > Semaphore::MAX_PERMITS {
            return Err(LimiterError::TooLarge {
                requested: maximum,
                limit: Semaphore::MAX_PERMITS,
            });
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(maximum)),
            maximum,
        })
    }

    /// Waits until a permit is free and takes it.
    ///
    /// Waiters are not promised FIFO order; the only guarantee is that no
    /// more than [`maximum`](Self::maximum) permits are ever out at once.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::Closed`] if the gate is closed before or while
    /// waiting.
    pub async fn acquire(&self) -> Result<Permit, LimiterError> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map(Permit::new)
            .map_err(|_| LimiterError::Closed)
    }

    /// Takes a permit only if one is free right now.
    pub fn try_acquire(&self) -> Option<Permit> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Some(Permit::new(permit)),
            Err(TryAcquireError::NoPermits | TryAcquireError::Closed) => None,
        }
    }

    /// Capacity fixed at construction.
    pub fn maximum(&self) -> usize {
        self.maximum
    }

    /// Permits not currently held.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Permits currently held by workers (or by the listener between acquire
    /// and dispatch).
    pub fn held(&self) -> usize {
        self.snapshot().held()
    }

    pub fn snapshot(&self) -> GateSnapshot {
        GateSnapshot::new(self.maximum, self.available())
    }

    /// Closes the gate.
    ///
    /// Pending and future [`acquire`](Self::acquire) calls fail with
    /// [`LimiterError::Closed`].  Permits already handed out stay valid and
    /// are still returned when their workers finish.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}

/// One admission slot, held by the worker that owns a connection.
///
/// Dropping the permit releases the slot.
#[derive(Debug)]
#[must_use = "dropping a permit immediately releases the admission slot"]
pub struct Permit {
    _inner: OwnedSemaphorePermit,
}

impl Permit {
    fn new(inner: OwnedSemaphorePermit) -> Self {
        Self { _inner: inner }
    }

    /// Returns the slot to the gate.  Equivalent to dropping the permit.
    pub fn release(self) {
        drop(self);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
