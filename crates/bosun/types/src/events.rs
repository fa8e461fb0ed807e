//! Lifecycle events published by the engines

use crate::ids::DeployableId;
use crate::state::{ApplicationState, LocalServiceState, TaskState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Info,
    Warning,
    Error,
}

/// Lifecycle progress visible to external observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    ApplicationStateChange {
        app_id: DeployableId,
        name: String,
        version: String,
        state: ApplicationState,
    },
    LocalServiceStateChange {
        service_id: DeployableId,
        name: String,
        version: String,
        state: LocalServiceState,
    },
    TaskStateChange {
        source_app_name: String,
        task_id: String,
        state: TaskState,
    },
    TaskCompleted {
        source_app_name: String,
        task_id: String,
    },
}

impl LifecycleEvent {
    pub fn severity(&self) -> EventSeverity {
        match self {
            LifecycleEvent::ApplicationStateChange { state, .. } if *state == ApplicationState::Failed => {
                EventSeverity::Error
            }
            LifecycleEvent::TaskStateChange { state, .. } if *state == TaskState::Lost => {
                EventSeverity::Warning
            }
            _ => EventSeverity::Info,
        }
    }
}

/// Event with delivery metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub severity: EventSeverity,
    pub event: LifecycleEvent,
}

impl EventEnvelope {
    pub fn new(event: LifecycleEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            severity: event.severity(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_severity() {
        let envelope = EventEnvelope::new(LifecycleEvent::TaskStateChange {
            source_app_name: "app".to_string(),
            task_id: "t1".to_string(),
            state: TaskState::Lost,
        });
        assert_eq!(envelope.severity, EventSeverity::Warning);

        let envelope = EventEnvelope::new(LifecycleEvent::ApplicationStateChange {
            app_id: DeployableId::new("app-1"),
            name: "app".to_string(),
            version: "1".to_string(),
            state: ApplicationState::Running,
        });
        assert_eq!(envelope.severity, EventSeverity::Info);
    }
}
