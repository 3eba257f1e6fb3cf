pub mod executor;
pub mod scheduler;

use std::sync::atomic::{AtomicBool, Ordering};

/// Per-run control flags shared between the scheduler and its workers.
/// Pause stops new dispatch immediately; cancel additionally marks the run
/// for termination. Neither flag interrupts an attempt by itself.
#[derive(Default)]
pub struct RunGate {
    paused: AtomicBool,
    cancelled: AtomicBool,
}

impl RunGate {
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn should_stop(&self) -> bool {
        self.is_paused() || self.is_cancelled()
    }
}
