//! Application layer for portgate-server.
//!
//! Contains the concurrency core that does not own any OS resource directly:
//!
//! - [`admission`] – the counting gate that bounds concurrent workers.
//! - [`worker`] – the per-connection unit of work and its cleanup guarantee.
//! - [`handler`] – what a worker does with the bytes it received.

pub mod admission;
pub mod handler;
pub mod worker;

pub use admission::{AdmissionLimiter, LimiterError, Permit};
pub use handler::{HandlerError, LogHandler, PayloadHandler};
pub use worker::{Assignment, ConnectionWorker, WorkerOutcome, WorkerSettings};
