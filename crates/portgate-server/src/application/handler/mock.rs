//! Recording handler for tests.
//!
//! Records every payload it receives so tests can assert on what the worker
//! delivered, and can be switched into failing or panicking modes to drive
//! the worker's error and unwind paths.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use portgate_core::Payload;

use super::{HandlerError, PayloadHandler};

/// How the handler reacts to a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Record and return `Ok`.
    Accept,
    /// Record and return [`HandlerError::Rejected`].
    Fail,
    /// Record, then panic.
    Panic,
}

/// A [`PayloadHandler`] that remembers what it was given.
pub struct RecordingHandler {
    behaviour: Behaviour,
    received: Mutex<Vec<(SocketAddr, Payload)>>,
    calls: AtomicUsize,
}

impl RecordingHandler {
    /// A handler that records and accepts every payload.
    pub fn new() -> Self {
        Self::with_behaviour(Behaviour::Accept)
    }

    /// A handler that records every payload and then reports an error.
    pub fn failing() -> Self {
        Self::with_behaviour(Behaviour::Fail)
    }

    /// A handler that records every payload and then panics.
    pub fn panicking() -> Self {
        Self::with_behaviour(Behaviour::Panic)
    }

    pub fn with_behaviour(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            received: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of times [`PayloadHandler::handle`] was called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Copies of every payload received so far, in arrival order.
    pub fn payloads(&self) -> Vec<Payload> {
        self.received
            .lock()
            .expect("lock poisoned")
            .iter()
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Message texts received so far, in arrival order.
    pub fn texts(&self) -> Vec<String> {
        self.payloads().iter().map(|p| p.text().into_owned()).collect()
    }

    /// Peers that delivered a payload, in arrival order.
    pub fn peers(&self) -> Vec<SocketAddr> {
        self.received
            .lock()
            .expect("lock poisoned")
            .iter()
            .map(|(peer, _)| *peer)
            .collect()
    }
}

impl Default for RecordingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadHandler for RecordingHandler {
    fn handle(&self, peer: SocketAddr, payload: &Payload) -> Result<(), HandlerError> {
        self.received
            .lock()
            .expect("lock poisoned")
            .push((peer, payload.clone()));
        self.calls.fetch_add(1, Ordering::SeqCst);

        match self.behaviour {
            Behaviour::Accept => Ok(()),
            Behaviour::Fail => Err(HandlerError::Rejected {
                peer,
                reason: "recording handler configured to fail".to_string(),
            }),
            Behaviour::Panic => panic!("recording handler configured to panic"),
        }
    }
}
