//! The accept seam between the listener loop and the OS.
//!
//! [`ListenerLoop`](crate::infrastructure::ListenerLoop) only needs "give me
//! the next connection".  [`Acceptor`] captures that, so the loop runs on a
//! real [`TcpListener`] in production and on
//! [`mock::ScriptedAcceptor`] in tests, where accept failures can be injected
//! in a fixed order.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

pub mod mock;

/// Source of accepted connections.
pub trait Acceptor: Send + Sync {
    /// The connected stream handed to a worker.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Address the acceptor is listening on (for logs).
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Waits for the next connection.
    fn accept(&self) -> impl Future<Output = io::Result<(Self::Stream, SocketAddr)>> + Send;
}

impl Acceptor for TcpListener {
    type Stream = TcpStream;

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }

    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(self)
    }
}
