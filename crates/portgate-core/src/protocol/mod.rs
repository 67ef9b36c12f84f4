//! Wire-level constants and the raw payload type.
//!
//! portgate has no application protocol.  The only contract between a
//! client and the server is: connect, send at most [`READ_BUFFER_SIZE`]
//! bytes, and expect the server to close the connection after one read.

pub mod payload;

pub use payload::{encode_message, Payload};

/// TCP port the server listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 5008;

/// Length of the OS-level queue of not-yet-accepted connections.
pub const DEFAULT_BACKLOG: u32 = 32;

/// Maximum number of connections handled at the same time.
pub const DEFAULT_MAX_CLIENTS: usize = 32;

/// Size of the buffer used for the single read each worker performs.
pub const READ_BUFFER_SIZE: usize = 1024;

/// Largest read buffer a server may be configured with (16 MiB).  Each
/// admitted connection allocates one buffer of the configured size.
pub const MAX_READ_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Well-known location of the single-instance lock file.
pub const DEFAULT_PID_FILE: &str = "/var/run/portgate.pid";
