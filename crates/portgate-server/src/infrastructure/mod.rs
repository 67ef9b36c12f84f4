//! Infrastructure layer for portgate-server.
//!
//! Everything that touches the OS lives here: the pid-file lock, the
//! listening socket, the accept loop, signal handling and the config file.
//!
//! # What does NOT belong here?
//!
//! - The admission gate and worker logic (application layer)
//! - Configuration defaults and validation (domain layer)

pub mod acceptor;
pub mod error;
pub mod listener;
pub mod shutdown;
pub mod signals;
pub mod singleton;
pub mod socket;
pub mod storage;

pub use acceptor::Acceptor;
pub use error::ServerError;
pub use listener::{ListenerLoop, ListenerState, LoopExit};
pub use shutdown::{shutdown_channel, ServerState, ShutdownHook, ShutdownSignal, ShutdownTrigger};
pub use singleton::{LockHandle, SingletonError};
pub use socket::listen_on;
