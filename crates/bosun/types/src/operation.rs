//! Operations accepted by the lifecycle engines
//!
//! Each operation names its target entity and carries a [`ClusterOpSpec`]
//! describing how the resulting cluster work should be executed.

use crate::ids::{DeployableId, InstanceId};
use crate::spec::{ApplicationSpec, LocalServiceSpec, TaskSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What to do when one of the parallel jobs of an operation fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureStrategy {
    Stop,
    Continue,
}

/// Execution parameters for cluster-level work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterOpSpec {
    pub timeout_ms: u64,
    pub parallelism: u32,
    pub failure_strategy: FailureStrategy,
}

impl Default for ClusterOpSpec {
    fn default() -> Self {
        Self {
            timeout_ms: 300_000,
            parallelism: 1,
            failure_strategy: FailureStrategy::Stop,
        }
    }
}

named_enum! {
    /// Discriminant of an [`ApplicationOperation`]
    ApplicationOperationType {
        Create => "CREATE",
        StartInstances => "START_INSTANCES",
        StopInstances => "STOP_INSTANCES",
        ScaleInstances => "SCALE_INSTANCES",
        ReplaceInstances => "REPLACE_INSTANCES",
        Suspend => "SUSPEND",
        Recover => "RECOVER",
        Destroy => "DESTROY",
    }
}

/// Commands for applications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationOperation {
    Create {
        spec: ApplicationSpec,
        instances: u64,
        op_spec: ClusterOpSpec,
    },
    StartInstances {
        app_id: DeployableId,
        instances: u64,
        op_spec: ClusterOpSpec,
    },
    StopInstances {
        app_id: DeployableId,
        instance_ids: Vec<InstanceId>,
        #[serde(default)]
        skip_respawn: bool,
        op_spec: ClusterOpSpec,
    },
    Scale {
        app_id: DeployableId,
        required_instances: u64,
        op_spec: ClusterOpSpec,
    },
    ReplaceInstances {
        app_id: DeployableId,
        #[serde(default)]
        instance_ids: BTreeSet<InstanceId>,
        #[serde(default)]
        stop_first: bool,
        op_spec: ClusterOpSpec,
    },
    Suspend {
        app_id: DeployableId,
        #[serde(default)]
        op_spec: Option<ClusterOpSpec>,
    },
    Recover {
        app_id: DeployableId,
    },
    Destroy {
        app_id: DeployableId,
        op_spec: ClusterOpSpec,
    },
}

impl ApplicationOperation {
    pub fn op_type(&self) -> ApplicationOperationType {
        match self {
            ApplicationOperation::Create { .. } => ApplicationOperationType::Create,
            ApplicationOperation::StartInstances { .. } => ApplicationOperationType::StartInstances,
            ApplicationOperation::StopInstances { .. } => ApplicationOperationType::StopInstances,
            ApplicationOperation::Scale { .. } => ApplicationOperationType::ScaleInstances,
            ApplicationOperation::ReplaceInstances { .. } => {
                ApplicationOperationType::ReplaceInstances
            }
            ApplicationOperation::Suspend { .. } => ApplicationOperationType::Suspend,
            ApplicationOperation::Recover { .. } => ApplicationOperationType::Recover,
            ApplicationOperation::Destroy { .. } => ApplicationOperationType::Destroy,
        }
    }

    /// Target application; derived from the spec for creation
    pub fn app_id(&self) -> DeployableId {
        match self {
            ApplicationOperation::Create { spec, .. } => spec.id(),
            ApplicationOperation::StartInstances { app_id, .. }
            | ApplicationOperation::StopInstances { app_id, .. }
            | ApplicationOperation::Scale { app_id, .. }
            | ApplicationOperation::ReplaceInstances { app_id, .. }
            | ApplicationOperation::Suspend { app_id, .. }
            | ApplicationOperation::Recover { app_id }
            | ApplicationOperation::Destroy { app_id, .. } => app_id.clone(),
        }
    }

    pub fn op_spec(&self) -> Option<&ClusterOpSpec> {
        match self {
            ApplicationOperation::Create { op_spec, .. }
            | ApplicationOperation::StartInstances { op_spec, .. }
            | ApplicationOperation::StopInstances { op_spec, .. }
            | ApplicationOperation::Scale { op_spec, .. }
            | ApplicationOperation::ReplaceInstances { op_spec, .. }
            | ApplicationOperation::Destroy { op_spec, .. } => Some(op_spec),
            ApplicationOperation::Suspend { op_spec, .. } => op_spec.as_ref(),
            ApplicationOperation::Recover { .. } => None,
        }
    }
}

named_enum! {
    /// Discriminant of a [`LocalServiceOperation`]
    LocalServiceOperationType {
        Create => "CREATE",
        Activate => "ACTIVATE",
        Deactivate => "DEACTIVATE",
        DeployTestInstance => "DEPLOY_TEST_INSTANCE",
        AdjustInstances => "ADJUST_INSTANCES",
        UpdateInstanceCount => "UPDATE_INSTANCE_COUNT",
        ReplaceInstances => "REPLACE_INSTANCES",
        StopInstances => "STOP_INSTANCES",
        Restart => "RESTART",
        Destroy => "DESTROY",
    }
}

/// Commands for local services
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocalServiceOperation {
    Create {
        spec: LocalServiceSpec,
        instances_per_host: u32,
        op_spec: ClusterOpSpec,
    },
    Activate {
        service_id: DeployableId,
        op_spec: ClusterOpSpec,
    },
    Deactivate {
        service_id: DeployableId,
        op_spec: ClusterOpSpec,
    },
    DeployTestInstance {
        service_id: DeployableId,
        op_spec: ClusterOpSpec,
    },
    AdjustInstances {
        service_id: DeployableId,
        op_spec: ClusterOpSpec,
    },
    UpdateInstanceCount {
        service_id: DeployableId,
        instances_per_host: u32,
        op_spec: ClusterOpSpec,
    },
    ReplaceInstances {
        service_id: DeployableId,
        #[serde(default)]
        instance_ids: BTreeSet<InstanceId>,
        #[serde(default)]
        stop_first: bool,
        op_spec: ClusterOpSpec,
    },
    StopInstances {
        service_id: DeployableId,
        instance_ids: BTreeSet<InstanceId>,
        op_spec: ClusterOpSpec,
    },
    Restart {
        service_id: DeployableId,
        #[serde(default)]
        stop_first: bool,
        op_spec: ClusterOpSpec,
    },
    Destroy {
        service_id: DeployableId,
        op_spec: ClusterOpSpec,
    },
}

impl LocalServiceOperation {
    pub fn op_type(&self) -> LocalServiceOperationType {
        match self {
            LocalServiceOperation::Create { .. } => LocalServiceOperationType::Create,
            LocalServiceOperation::Activate { .. } => LocalServiceOperationType::Activate,
            LocalServiceOperation::Deactivate { .. } => LocalServiceOperationType::Deactivate,
            LocalServiceOperation::DeployTestInstance { .. } => {
                LocalServiceOperationType::DeployTestInstance
            }
            LocalServiceOperation::AdjustInstances { .. } => {
                LocalServiceOperationType::AdjustInstances
            }
            LocalServiceOperation::UpdateInstanceCount { .. } => {
                LocalServiceOperationType::UpdateInstanceCount
            }
            LocalServiceOperation::ReplaceInstances { .. } => {
                LocalServiceOperationType::ReplaceInstances
            }
            LocalServiceOperation::StopInstances { .. } => LocalServiceOperationType::StopInstances,
            LocalServiceOperation::Restart { .. } => LocalServiceOperationType::Restart,
            LocalServiceOperation::Destroy { .. } => LocalServiceOperationType::Destroy,
        }
    }

    pub fn service_id(&self) -> DeployableId {
        match self {
            LocalServiceOperation::Create { spec, .. } => spec.id(),
            LocalServiceOperation::Activate { service_id, .. }
            | LocalServiceOperation::Deactivate { service_id, .. }
            | LocalServiceOperation::DeployTestInstance { service_id, .. }
            | LocalServiceOperation::AdjustInstances { service_id, .. }
            | LocalServiceOperation::UpdateInstanceCount { service_id, .. }
            | LocalServiceOperation::ReplaceInstances { service_id, .. }
            | LocalServiceOperation::StopInstances { service_id, .. }
            | LocalServiceOperation::Restart { service_id, .. }
            | LocalServiceOperation::Destroy { service_id, .. } => service_id.clone(),
        }
    }

    pub fn op_spec(&self) -> &ClusterOpSpec {
        match self {
            LocalServiceOperation::Create { op_spec, .. }
            | LocalServiceOperation::Activate { op_spec, .. }
            | LocalServiceOperation::Deactivate { op_spec, .. }
            | LocalServiceOperation::DeployTestInstance { op_spec, .. }
            | LocalServiceOperation::AdjustInstances { op_spec, .. }
            | LocalServiceOperation::UpdateInstanceCount { op_spec, .. }
            | LocalServiceOperation::ReplaceInstances { op_spec, .. }
            | LocalServiceOperation::StopInstances { op_spec, .. }
            | LocalServiceOperation::Restart { op_spec, .. }
            | LocalServiceOperation::Destroy { op_spec, .. } => op_spec,
        }
    }
}

/// Commands for one-shot tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskOperation {
    Create {
        spec: TaskSpec,
        op_spec: ClusterOpSpec,
    },
    Kill {
        source_app_name: String,
        task_id: String,
        op_spec: ClusterOpSpec,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_type_names() {
        let op = ApplicationOperation::Scale {
            app_id: DeployableId::new("app-1"),
            required_instances: 3,
            op_spec: ClusterOpSpec::default(),
        };
        assert_eq!(op.op_type(), ApplicationOperationType::ScaleInstances);
        assert_eq!(op.op_type().to_string(), "SCALE_INSTANCES");
        assert_eq!(op.app_id().as_str(), "app-1");
    }

    #[test]
    fn test_suspend_without_op_spec() {
        let op = ApplicationOperation::Suspend {
            app_id: DeployableId::new("app-1"),
            op_spec: None,
        };
        assert!(op.op_spec().is_none());
    }

    #[test]
    fn test_operation_wire_tag() {
        let op = LocalServiceOperation::Restart {
            service_id: DeployableId::new("svc-1"),
            stop_first: true,
            op_spec: ClusterOpSpec::default(),
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "RESTART");
        assert_eq!(json["service_id"], "svc-1");
    }
}
