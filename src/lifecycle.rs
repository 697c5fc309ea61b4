//! Process lifecycle flags.
//!
//! The binary flips these around startup and shutdown; the health aggregator
//! only reads them. Kept behind a trait so tests can simulate any phase.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Read-only view of the process lifecycle.
pub trait ServerLifecycle: Send + Sync + fmt::Debug {
    fn is_server_started(&self) -> bool;
    fn is_server_shutting_down(&self) -> bool;
}

/// Default lifecycle handle backed by atomics.
#[derive(Debug, Default)]
pub struct ProcessLifecycle {
    started: AtomicBool,
    shutting_down: AtomicBool,
}

impl ProcessLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_started(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    pub fn mark_shutting_down(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }
}

impl ServerLifecycle for ProcessLifecycle {
    fn is_server_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    fn is_server_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let lifecycle = ProcessLifecycle::new();
        assert!(!lifecycle.is_server_started());
        assert!(!lifecycle.is_server_shutting_down());

        lifecycle.mark_started();
        assert!(lifecycle.is_server_started());

        lifecycle.mark_shutting_down();
        assert!(lifecycle.is_server_shutting_down());
        assert!(lifecycle.is_server_started());
    }
}
