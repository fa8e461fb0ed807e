//! Mutable records held in the durable state store

use crate::ids::{DeployableId, ExecutorId, InstanceId};
use crate::resources::ResourceAllocation;
use crate::spec::{ApplicationSpec, LocalServiceSpec};
use crate::state::{ActivationState, InstanceState, TaskState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Desired state of an application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationInfo {
    pub app_id: DeployableId,
    pub spec: ApplicationSpec,
    /// Desired instance count
    pub instances: u64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl ApplicationInfo {
    pub fn new(spec: ApplicationSpec, instances: u64) -> Self {
        let now = Utc::now();
        Self {
            app_id: spec.id(),
            spec,
            instances,
            created: now,
            updated: now,
        }
    }

    pub fn with_instances(&self, instances: u64) -> Self {
        Self {
            instances,
            updated: Utc::now(),
            ..self.clone()
        }
    }
}

/// Desired state of a local service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalServiceInfo {
    pub service_id: DeployableId,
    pub spec: LocalServiceSpec,
    pub instances_per_host: u32,
    pub activation_state: ActivationState,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl LocalServiceInfo {
    pub fn new(spec: LocalServiceSpec, instances_per_host: u32) -> Self {
        let now = Utc::now();
        Self {
            service_id: spec.id(),
            spec,
            instances_per_host,
            activation_state: ActivationState::Inactive,
            created: now,
            updated: now,
        }
    }

    pub fn with_activation_state(&self, activation_state: ActivationState) -> Self {
        Self {
            activation_state,
            updated: Utc::now(),
            ..self.clone()
        }
    }

    pub fn with_instances_per_host(&self, instances_per_host: u32) -> Self {
        Self {
            instances_per_host,
            updated: Utc::now(),
            ..self.clone()
        }
    }
}

/// One application instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub app_id: DeployableId,
    pub app_name: String,
    pub instance_id: InstanceId,
    pub executor_id: ExecutorId,
    pub hostname: String,
    #[serde(default)]
    pub resources: Vec<ResourceAllocation>,
    pub state: InstanceState,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl InstanceInfo {
    pub fn with_state(&self, state: InstanceState, error_message: Option<String>) -> Self {
        Self {
            state,
            error_message,
            updated: Utc::now(),
            ..self.clone()
        }
    }
}

/// One local service instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalServiceInstanceInfo {
    pub service_id: DeployableId,
    pub service_name: String,
    pub instance_id: InstanceId,
    pub executor_id: ExecutorId,
    pub hostname: String,
    #[serde(default)]
    pub resources: Vec<ResourceAllocation>,
    pub state: InstanceState,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl LocalServiceInstanceInfo {
    pub fn with_state(&self, state: InstanceState, error_message: Option<String>) -> Self {
        Self {
            state,
            error_message,
            updated: Utc::now(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskResultStatus {
    Successful,
    Failed,
    Cancelled,
    Lost,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: TaskResultStatus,
    pub exit_code: i64,
}

/// One task run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub source_app_name: String,
    pub task_id: String,
    pub instance_id: InstanceId,
    pub executor_id: ExecutorId,
    pub hostname: String,
    #[serde(default)]
    pub resources: Vec<ResourceAllocation>,
    pub state: TaskState,
    #[serde(default)]
    pub result: Option<TaskResult>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl TaskInfo {
    /// Copy of this task marked lost
    pub fn as_lost(&self) -> Self {
        Self {
            state: TaskState::Lost,
            result: Some(TaskResult {
                status: TaskResultStatus::Lost,
                exit_code: -1,
            }),
            error_message: Some("Instance lost".to_string()),
            updated: Utc::now(),
            ..self.clone()
        }
    }
}
