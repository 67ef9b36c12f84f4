//! # portgate-core
//!
//! Shared library for portgate containing the wire constants, the raw
//! payload type delivered to connection workers, the pid-file text format
//! used by the single-instance guard, and the capacity accounting snapshot.
//!
//! This crate is used by both the server and the `portgate-send` client.
//! It has zero dependencies on OS APIs, async runtimes, or network sockets.
//!
//! # Overview
//!
//! - **`protocol`** – What travels over the wire.  There is no framing: a
//!   client connects, writes one NUL-terminated message, and the server
//!   performs a single bounded read.
//!
//! - **`domain`** – Pure value types shared by the server's layers: the
//!   pid-file content format and the [`GateSnapshot`] that describes how many
//!   admission permits are in use.

pub mod domain;
pub mod protocol;

pub use domain::capacity::GateSnapshot;
pub use domain::pidfile;
pub use protocol::payload::{encode_message, Payload};
