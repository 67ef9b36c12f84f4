//! Listener-scope errors.
//!
//! Only failures that make further accepts impossible are represented here;
//! they end the accept loop and the process exits non-zero.  Per-connection
//! failures never leave the worker (see `application::worker`).

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::application::admission::LimiterError;

#[derive(Debug, Error)]
pub enum ServerError {
    /// The socket could not be created or bound to the configured address.
    #[error("bind failed on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The bound socket could not be put into the listening state.
    #[error("listen failed on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// accept() failed in a way that retrying cannot fix.
    #[error("fatal accept error: {source}")]
    FatalAccept {
        #[source]
        source: io::Error,
    },

    /// The admission gate could not be created.
    #[error("admission gate: {0}")]
    Limiter(#[from] LimiterError),

    /// The server state has no listening socket to run on.
    #[error("no listening socket is available")]
    NotListening,
}
