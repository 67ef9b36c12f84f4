//! portgate-server library crate.
//!
//! A TCP listener that admits at most a fixed number of concurrent client
//! connections, hands each accepted connection to its own worker task, and
//! refuses to start when another instance already holds the pid-file lock.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! [portgate-server]
//!   ├── domain/           Pure types: ServerConfig, Connection, validation errors
//!   ├── application/      AdmissionLimiter, ConnectionWorker, PayloadHandler
//!   └── infrastructure/
//!         ├── singleton/  fcntl pid-file lock
//!         ├── socket/     listen_on (bind + listen with backlog)
//!         ├── listener/   accept loop state machine
//!         ├── shutdown/   ServerState, ShutdownHook, shutdown signal
//!         ├── signals/    SIGINT / SIGTERM → shutdown trigger
//!         └── storage/    TOML config file
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `portgate-core`; it is generic over
//!   the stream type so it can be tested with in-memory streams.
//! - `infrastructure` owns every socket, file descriptor and OS signal.

/// Domain layer: configuration and connection value types (no I/O).
pub mod domain;

/// Application layer: admission control and per-connection work.
pub mod application;

/// Infrastructure layer: sockets, pid-file lock, accept loop, shutdown.
pub mod infrastructure;
