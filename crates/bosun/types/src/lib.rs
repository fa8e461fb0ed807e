//! Bosun Types - Core types for deployable lifecycle orchestration
//!
//! Bosun drives deployable workloads (applications, local services and
//! one-shot tasks) through their lifecycle. This crate holds the value
//! types shared by the state store, the state machines and the engines.
//!
//! ## Key Concepts
//!
//! - **Spec**: Immutable, user-submitted definition of a deployable
//! - **Info**: Mutable record in the durable store; owns the desired instance count
//! - **Operation**: Command routed to a deployable's reconciliation actor
//! - **State**: Closed per-kind lifecycle enum
//! - **ValidationResult**: Admission outcome, never empty

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

/// Fieldless enum with an upper snake case name per variant
macro_rules! named_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            ::serde::Serialize, ::serde::Deserialize,
        )]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub mod events;
pub mod ids;
pub mod info;
pub mod operation;
pub mod resources;
pub mod spec;
pub mod state;
pub mod validation;

// Re-export main types
pub use events::{EventEnvelope, EventSeverity, LifecycleEvent};
pub use ids::{run_task_id, DeployableId, ExecutorId, InstanceId};
pub use info::{
    ApplicationInfo, InstanceInfo, LocalServiceInfo, LocalServiceInstanceInfo, TaskInfo,
    TaskResult, TaskResultStatus,
};
pub use operation::{
    ApplicationOperation, ApplicationOperationType, ClusterOpSpec, FailureStrategy,
    LocalServiceOperation, LocalServiceOperationType, TaskOperation,
};
pub use resources::{
    cores_per_instance, memory_per_instance, ExecutorResourceSnapshot, PhysicalLayout,
    ResourceAllocation, ResourceRequirement,
};
pub use spec::{
    ApplicationSpec, CheckMode, CheckSpec, DeviceSpec, Executable, ExposureMode, ExposureSpec,
    LocalServiceSpec, MountMode, MountedVolume, PlacementPolicy, PortSpec, PortType, TaskSpec,
};
pub use state::{ActivationState, ApplicationState, InstanceState, LocalServiceState, TaskState};
pub use validation::{ValidationResult, ValidationStatus};
