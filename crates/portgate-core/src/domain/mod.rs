//! Domain value types shared by the server layers.
//!
//! Nothing here performs I/O: the pid-file module only formats and parses
//! text, and the capacity module only describes permit counts.

pub mod capacity;
pub mod pidfile;

pub use capacity::GateSnapshot;
