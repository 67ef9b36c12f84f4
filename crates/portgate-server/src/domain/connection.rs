//! The accepted-connection value handed to a worker.

use std::fmt;
use std::net::SocketAddr;

use uuid::Uuid;

/// Identifier attached to every log line about one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    /// Shows the first 8 hex digits; enough to tell log lines apart.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}

/// An accepted client connection.
///
/// Owned by exactly one worker.  The stream is closed when the connection is
/// dropped, so ownership is the whole lifetime story: no worker can observe
/// another worker's socket.
///
/// Generic over the stream so workers can be driven by in-memory streams in
/// tests; in production `S` is `tokio::net::TcpStream`.
#[derive(Debug)]
pub struct Connection<S> {
    id: ConnectionId,
    peer: SocketAddr,
    stream: S,
}

impl<S> Connection<S> {
    /// Wraps a freshly accepted stream and assigns it a new id.
    pub fn new(stream: S, peer: SocketAddr) -> Self {
        Self {
            id: ConnectionId::new(),
            peer,
            stream,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Address of the remote end as reported by accept.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Gives up the wrapper and returns the stream.
    pub fn into_stream(self) -> S {
        self.stream
    }
}
