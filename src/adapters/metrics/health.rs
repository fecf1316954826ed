//! Health State - Liveness and Readiness
//!
//! Readiness is flipped off once shutdown starts so load balancers
//! stop routing new swaps while in-flight monitors are drained.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared health state polled by readiness probes.
#[derive(Debug, Clone)]
pub struct HealthState {
    /// Whether the service accepts new swaps.
    accepting: Arc<AtomicBool>,
}

impl HealthState {
    /// Create a new health state (ready by default).
    pub fn new() -> Self {
        Self {
            accepting: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Check if the service is ready to take traffic.
    pub fn is_ready(&self) -> bool {
        self.accepting.load(Ordering::Relaxed)
    }

    /// Stop advertising readiness (graceful shutdown).
    pub fn mark_draining(&self) {
        self.accepting.store(false, Ordering::Relaxed);
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}
