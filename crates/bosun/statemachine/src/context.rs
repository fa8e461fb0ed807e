//! Per-machine context plumbing

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Single pending update plus the stopped flag of one machine
///
/// At most one update is pending at a time. The action that consumes it
/// acks it, which frees the slot for the next one.
#[derive(Debug)]
pub struct UpdateSlot<U> {
    pending: Mutex<Option<U>>,
    stopped: AtomicBool,
}

impl<U: Clone> UpdateSlot<U> {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Stage an update; false when one is already pending
    pub fn record(&self, update: U) -> bool {
        let mut pending = self.pending.lock();
        if pending.is_some() {
            return false;
        }
        *pending = Some(update);
        true
    }

    pub fn get(&self) -> Option<U> {
        self.pending.lock().clone()
    }

    /// Clear the pending update; true if there was one
    pub fn ack(&self) -> bool {
        self.pending.lock().take().is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn mark_stopped(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

impl<U: Clone> Default for UpdateSlot<U> {
    fn default() -> Self {
        Self::new()
    }
}

/// Context handed to every action of a machine
pub trait MachineContext<U>: Send + Sync + 'static {
    fn updates(&self) -> &UpdateSlot<U>;
}
