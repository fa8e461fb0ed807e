//! Durable store contracts and in-memory backends

mod memory;
mod traits;

pub use memory::{
    InMemoryApplicationStore, InMemoryClusterResources, InMemoryInstanceStore,
    InMemoryLocalServiceStore, InMemoryTaskStore,
};
pub use traits::{
    is_stale, stale_instance_age, ApplicationStateStore, ClusterResourcesStore,
    InstanceInfoStore, LocalServiceStateStore, TaskStateNotifier, TaskStore,
};
