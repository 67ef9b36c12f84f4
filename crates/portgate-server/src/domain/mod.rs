//! Domain layer for portgate-server.
//!
//! # What belongs in the domain layer?
//!
//! - Runtime configuration ([`ServerConfig`]) and its validation rules
//! - The [`Connection`] value moved into each worker
//!
//! # What does NOT belong here?
//!
//! - Any `tokio` types, sockets, or file handles
//! - Reading configuration files or environment variables

pub mod config;
pub mod connection;

pub use config::{InvalidConfig, ServerConfig};
pub use connection::{Connection, ConnectionId};
