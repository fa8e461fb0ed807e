//! Lifecycle states for deployables and their instances
//!
//! State names render in upper snake case, which is also the wire format.

named_enum! {
    /// Application lifecycle state
    ApplicationState {
        Init => "INIT",
        Monitoring => "MONITORING",
        Running => "RUNNING",
        OutageDetected => "OUTAGE_DETECTED",
        ScalingRequested => "SCALING_REQUESTED",
        StopInstancesRequested => "STOP_INSTANCES_REQUESTED",
        ReplaceInstancesRequested => "REPLACE_INSTANCES_REQUESTED",
        DestroyRequested => "DESTROY_REQUESTED",
        Destroyed => "DESTROYED",
        Failed => "FAILED",
    }
}

impl ApplicationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ApplicationState::Destroyed | ApplicationState::Failed)
    }
}

named_enum! {
    /// Local service lifecycle state
    LocalServiceState {
        Init => "INIT",
        ActivationRequested => "ACTIVATION_REQUESTED",
        Active => "ACTIVE",
        DeactivationRequested => "DEACTIVATION_REQUESTED",
        EmergencyDeactivationRequested => "EMERGENCY_DEACTIVATION_REQUESTED",
        Inactive => "INACTIVE",
        ConfigTestingRequested => "CONFIG_TESTING_REQUESTED",
        ConfigTesting => "CONFIG_TESTING",
        UpdatingInstancesCount => "UPDATING_INSTANCES_COUNT",
        AdjustingInstances => "ADJUSTING_INSTANCES",
        ReplacingInstances => "REPLACING_INSTANCES",
        StoppingInstances => "STOPPING_INSTANCES",
        DestroyRequested => "DESTROY_REQUESTED",
        Destroyed => "DESTROYED",
    }
}

impl LocalServiceState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LocalServiceState::Destroyed)
    }
}

named_enum! {
    /// Whether a local service should be running on the cluster
    ActivationState {
        Active => "ACTIVE",
        Inactive => "INACTIVE",
        ConfigTesting => "CONFIG_TESTING",
        Unknown => "UNKNOWN",
    }
}

named_enum! {
    /// State of one application or local service instance
    InstanceState {
        Pending => "PENDING",
        Provisioning => "PROVISIONING",
        ProvisioningFailed => "PROVISIONING_FAILED",
        Starting => "STARTING",
        StartFailed => "START_FAILED",
        Unready => "UNREADY",
        Ready => "READY",
        Healthy => "HEALTHY",
        Unhealthy => "UNHEALTHY",
        Deprovisioning => "DEPROVISIONING",
        Stopping => "STOPPING",
        Stopped => "STOPPED",
        Lost => "LOST",
        Unknown => "UNKNOWN",
    }
}

impl InstanceState {
    pub const ACTIVE_STATES: &'static [InstanceState] = &[
        InstanceState::Pending,
        InstanceState::Provisioning,
        InstanceState::Starting,
        InstanceState::Unready,
        InstanceState::Ready,
        InstanceState::Healthy,
        InstanceState::Unhealthy,
        InstanceState::Deprovisioning,
        InstanceState::Stopping,
    ];

    /// States counted as already running or on the way to running
    pub const RUNNING_STATES: &'static [InstanceState] = &[
        InstanceState::Pending,
        InstanceState::Provisioning,
        InstanceState::Healthy,
        InstanceState::Starting,
        InstanceState::Unready,
        InstanceState::Ready,
    ];

    pub fn is_active(&self) -> bool {
        Self::ACTIVE_STATES.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

named_enum! {
    /// State of a task instance
    TaskState {
        Pending => "PENDING",
        Provisioning => "PROVISIONING",
        ProvisioningFailed => "PROVISIONING_FAILED",
        Starting => "STARTING",
        Running => "RUNNING",
        RunCompleted => "RUN_COMPLETED",
        Deprovisioning => "DEPROVISIONING",
        Stopped => "STOPPED",
        Lost => "LOST",
        Unknown => "UNKNOWN",
    }
}

impl TaskState {
    pub const ACTIVE_STATES: &'static [TaskState] = &[
        TaskState::Pending,
        TaskState::Provisioning,
        TaskState::Starting,
        TaskState::Running,
        TaskState::RunCompleted,
        TaskState::Deprovisioning,
    ];

    pub fn is_active(&self) -> bool {
        Self::ACTIVE_STATES.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names_match_wire_format() {
        for state in ApplicationState::ALL {
            let json = serde_json::to_string(state).unwrap();
            assert_eq!(json, format!("\"{}\"", state));
        }
        for state in LocalServiceState::ALL {
            let json = serde_json::to_string(state).unwrap();
            assert_eq!(json, format!("\"{}\"", state));
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(ApplicationState::Destroyed.is_terminal());
        assert!(ApplicationState::Failed.is_terminal());
        assert!(!ApplicationState::Running.is_terminal());
        assert!(LocalServiceState::Destroyed.is_terminal());
        assert!(TaskState::Stopped.is_terminal());
        assert!(!TaskState::Running.is_terminal());
    }

    #[test]
    fn test_instance_activity() {
        assert!(InstanceState::Healthy.is_active());
        assert!(!InstanceState::Stopped.is_active());
        assert!(!InstanceState::Lost.is_active());
        assert!(!InstanceState::Unknown.is_active());
    }
}
