//! Lifecycle event publication
//!
//! Engines publish through the [`EventBus`] seam. [`BroadcastEventBus`] fans
//! events out to any number of subscribers over a tokio broadcast channel.

use crate::config::EngineConfig;
use bosun_types::{EventEnvelope, LifecycleEvent};
use tokio::sync::broadcast;
use tracing::debug;

/// Default channel capacity for the event stream
pub const EVENT_CHANNEL_CAPACITY: usize = 16384;

/// Sink for lifecycle events
pub trait EventBus: Send + Sync {
    fn publish(&self, event: LifecycleEvent);
}

/// In-process event bus backed by a broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastEventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Bus sized by `event_channel_capacity`
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.event_channel_capacity)
    }

    /// Subscribe to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl EventBus for BroadcastEventBus {
    fn publish(&self, event: LifecycleEvent) {
        let envelope = EventEnvelope::new(event);
        debug!(event_id = %envelope.id, severity = ?envelope.severity, "Publishing lifecycle event");
        // No subscribers is fine
        let _ = self.tx.send(envelope);
    }
}
