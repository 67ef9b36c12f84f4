//! Capacity accounting for the admission gate.

use std::fmt;

/// Point-in-time view of the admission gate.
///
/// `available` is read from the live gate, so by the time a caller inspects a
/// snapshot another task may already have taken or returned a permit.  The
/// invariant `held() <= maximum` holds for every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSnapshot {
    /// Number of permits the gate was created with.
    pub maximum: usize,
    /// Permits not currently held by any worker.
    pub available: usize,
}

impl GateSnapshot {
    /// Builds a snapshot, clamping `available` so `held()` cannot underflow.
    pub fn new(maximum: usize, available: usize) -> Self {
        Self {
            maximum,
            available: available.min(maximum),
        }
    }

    /// Permits currently held by active workers.
    pub fn held(&self) -> usize {
        self.maximum - self.available
    }

    /// `true` when no permit is free and the next acquire would wait.
    pub fn is_exhausted(&self) -> bool {
        self.available == 0
    }

    /// `true` when every permit has been returned.
    pub fn is_idle(&self) -> bool {
        self.available == self.maximum
    }
}

impl fmt::Display for GateSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} slots in use", self.held(), self.maximum)
    }
}
