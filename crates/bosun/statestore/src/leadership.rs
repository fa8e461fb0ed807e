//! Leadership observer
//!
//! Election itself happens elsewhere; this holds the current flag and fans
//! changes out to registered callbacks.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

type LeadershipCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Tracks whether this node is the leader
#[derive(Default)]
pub struct LeadershipObserver {
    leader: AtomicBool,
    callbacks: RwLock<Vec<LeadershipCallback>>,
}

impl LeadershipObserver {
    pub fn new(leader: bool) -> Self {
        Self {
            leader: AtomicBool::new(leader),
            callbacks: RwLock::new(Vec::new()),
        }
    }

    pub fn is_leader(&self) -> bool {
        self.leader.load(Ordering::SeqCst)
    }

    /// Set the flag; callbacks run only when it actually flips
    pub fn set_leader(&self, leader: bool) {
        let previous = self.leader.swap(leader, Ordering::SeqCst);
        if previous == leader {
            return;
        }
        info!(leader, "Leadership changed");

        let callbacks: Vec<LeadershipCallback> = self.callbacks.read().clone();
        for callback in callbacks {
            callback(leader);
        }
    }

    pub fn on_change(&self, callback: impl Fn(bool) + Send + Sync + 'static) {
        self.callbacks.write().push(Arc::new(callback));
    }
}
