//! Server configuration types.
//!
//! [`ServerConfig`] is the single source of truth for runtime settings.  It is
//! populated by `main.rs` from the config file, environment and CLI (see
//! `infrastructure::storage`) and validated once before the listener starts.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use portgate_core::protocol::{
    DEFAULT_BACKLOG, DEFAULT_MAX_CLIENTS, DEFAULT_PID_FILE, DEFAULT_PORT, MAX_READ_BUFFER_SIZE,
    READ_BUFFER_SIZE,
};
use thiserror::Error;

/// A configuration value that cannot be used to start the server.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid `{field}`: {reason}")]
pub struct InvalidConfig {
    /// Name of the offending setting as it appears in the config file.
    pub field: &'static str,
    /// Human-readable explanation.
    pub reason: String,
}

impl InvalidConfig {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// All runtime configuration for the listener.
///
/// # Example
///
/// ```rust
/// use portgate_server::domain::ServerConfig;
///
/// let cfg = ServerConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 5008);
/// assert_eq!(cfg.max_clients, 32);
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address and port the listening socket binds to.
    pub bind_addr: SocketAddr,

    /// Length of the kernel queue of connections waiting to be accepted.
    ///
    /// While every admission slot is busy the listener stops calling accept,
    /// so this queue is what holds the excess clients.
    pub backlog: u32,

    /// Maximum number of connections handled at the same time.
    pub max_clients: usize,

    /// Size of the buffer for the single read each worker performs.
    pub read_buffer_size: usize,

    /// Upper bound on how long a worker waits for the client's message.
    ///
    /// `None` waits forever: a connected but silent client keeps its slot
    /// until it disconnects.
    pub read_timeout: Option<Duration>,

    /// Path of the single-instance lock file.
    pub pid_file: PathBuf,
}

impl ServerConfig {
    /// Checks the invariants the listener relies on.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidConfig`] naming the first setting that is out of
    /// range.
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.max_clients == 0 {
            return Err(InvalidConfig::new(
                "max_clients",
                "at least one concurrent client must be allowed",
            ));
        }
        if self.backlog == 0 {
            return Err(InvalidConfig::new("backlog", "must be at least 1"));
        }
        if self.read_buffer_size == 0 {
            return Err(InvalidConfig::new("read_buffer_size", "must be at least 1 byte"));
        }
        if self.read_buffer_size > MAX_READ_BUFFER_SIZE {
            return Err(InvalidConfig::new(
                "read_buffer_size",
                format!("must not exceed {MAX_READ_BUFFER_SIZE} bytes"),
            ));
        }
        if self.read_timeout == Some(Duration::ZERO) {
            return Err(InvalidConfig::new(
                "read_timeout_secs",
                "must be greater than zero; omit it to wait forever",
            ));
        }
        if self.pid_file.as_os_str().is_empty() {
            return Err(InvalidConfig::new("pid_file", "must not be empty"));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    /// | Field            | Default                  |
    /// |------------------|--------------------------|
    /// | bind_addr        | `0.0.0.0:5008`           |
    /// | backlog          | 32                       |
    /// | max_clients      | 32                       |
    /// | read_buffer_size | 1024                     |
    /// | read_timeout     | none                     |
    /// | pid_file         | `/var/run/portgate.pid`  |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            backlog: DEFAULT_BACKLOG,
            max_clients: DEFAULT_MAX_CLIENTS,
            read_buffer_size: READ_BUFFER_SIZE,
            read_timeout: None,
            pid_file: PathBuf::from(DEFAULT_PID_FILE),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
