//! Scripted acceptor for tests.
//!
//! Each call to [`Acceptor::accept`] pops the next scripted step: either an
//! error or an in-memory connection.  Once the script is empty, accept waits
//! forever, like a listener with no pending clients.

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use tokio::io::{duplex, DuplexStream};

use super::Acceptor;

/// Capacity of each side of a scripted connection's in-memory pipe.
const PIPE_CAPACITY: usize = 4096;

type Step = io::Result<(DuplexStream, SocketAddr)>;

/// An [`Acceptor`] that replays a fixed sequence of results.
pub struct ScriptedAcceptor {
    addr: SocketAddr,
    script: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
}

impl ScriptedAcceptor {
    pub fn new() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 5008)),
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queues a failed accept.
    pub fn push_error(&self, err: io::Error) {
        self.script.lock().expect("lock poisoned").push_back(Err(err));
    }

    /// Queues a connection from `peer` and returns the client's end of it.
    pub fn push_connection(&self, peer: SocketAddr) -> DuplexStream {
        let (client, server) = duplex(PIPE_CAPACITY);
        self.script
            .lock()
            .expect("lock poisoned")
            .push_back(Ok((server, peer)));
        client
    }

    /// Number of times accept was called, including the one currently waiting.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Steps not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().expect("lock poisoned").len()
    }
}

impl Default for ScriptedAcceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Acceptor for ScriptedAcceptor {
    type Stream = DuplexStream;

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }

    fn accept(&self) -> impl Future<Output = Step> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().expect("lock poisoned").pop_front();
        async move {
            match next {
                Some(step) => step,
                None => std::future::pending().await,
            }
        }
    }
}
