//! Durable store contracts
//!
//! Stores are synchronous: the caching proxies call them while holding a
//! cache lock, and no lock may be held across an await point. Not-found and
//! rejected writes are reported through `Option` and `bool`.

use bosun_types::{
    ApplicationInfo, DeployableId, ExecutorResourceSnapshot, InstanceId, InstanceInfo,
    InstanceState, LocalServiceInfo, LocalServiceInstanceInfo, TaskInfo, TaskState,
};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;
use tracing::info;

/// Age after which an instance or task record is considered stale
pub fn stale_instance_age() -> Duration {
    Duration::minutes(1)
}

/// True when a record last updated at `updated` is older than the stale age
pub fn is_stale(updated: DateTime<Utc>) -> bool {
    Utc::now() - updated > stale_instance_age()
}

/// Durable application records
pub trait ApplicationStateStore: Send + Sync {
    fn applications(&self) -> Vec<ApplicationInfo>;

    fn application(&self, app_id: &DeployableId) -> Option<ApplicationInfo>;

    fn update_application_state(&self, app_id: &DeployableId, info: &ApplicationInfo) -> bool;

    fn delete_application_state(&self, app_id: &DeployableId) -> bool;
}

/// Durable application instance records
pub trait InstanceInfoStore: Send + Sync {
    /// Instances of an app in any of `states`
    ///
    /// Stale records are left out unless `skip_stale_check` is set.
    fn instances(
        &self,
        app_id: &DeployableId,
        states: &[InstanceState],
        skip_stale_check: bool,
    ) -> Vec<InstanceInfo>;

    fn instance(&self, app_id: &DeployableId, instance_id: &InstanceId) -> Option<InstanceInfo>;

    fn update_instance_state(
        &self,
        app_id: &DeployableId,
        instance_id: &InstanceId,
        info: &InstanceInfo,
    ) -> bool;

    fn delete_instance_state(&self, app_id: &DeployableId, instance_id: &InstanceId) -> bool;

    fn delete_all_instance_states(&self, app_id: &DeployableId) -> bool;

    /// Rewrite stale active instances as LOST, returning how many changed
    fn mark_stale_instances(&self, app_id: &DeployableId) -> usize;

    fn active_instances(&self, app_id: &DeployableId) -> Vec<InstanceInfo> {
        self.instances(app_id, InstanceState::ACTIVE_STATES, false)
    }

    fn healthy_instances(&self, app_id: &DeployableId) -> Vec<InstanceInfo> {
        self.instances(app_id, &[InstanceState::Healthy], false)
    }

    fn instance_count(&self, app_id: &DeployableId, states: &[InstanceState]) -> usize {
        self.instances(app_id, states, false).len()
    }
}

/// Durable local service and local service instance records
pub trait LocalServiceStateStore: Send + Sync {
    fn services(&self) -> Vec<LocalServiceInfo>;

    fn service(&self, service_id: &DeployableId) -> Option<LocalServiceInfo>;

    fn update_service(&self, service_id: &DeployableId, info: &LocalServiceInfo) -> bool;

    fn delete_service(&self, service_id: &DeployableId) -> bool;

    fn instances(
        &self,
        service_id: &DeployableId,
        states: &[InstanceState],
        skip_stale_check: bool,
    ) -> Vec<LocalServiceInstanceInfo>;

    fn instance(
        &self,
        service_id: &DeployableId,
        instance_id: &InstanceId,
    ) -> Option<LocalServiceInstanceInfo>;

    fn update_instance(
        &self,
        service_id: &DeployableId,
        instance_id: &InstanceId,
        info: &LocalServiceInstanceInfo,
    ) -> bool;

    fn delete_instance(&self, service_id: &DeployableId, instance_id: &InstanceId) -> bool;

    fn delete_all_instances(&self, service_id: &DeployableId) -> bool;

    fn mark_stale_instances(&self, service_id: &DeployableId) -> usize;

    fn healthy_instances(&self, service_id: &DeployableId) -> Vec<LocalServiceInstanceInfo> {
        self.instances(service_id, &[InstanceState::Healthy], false)
    }
}

/// Fan-out of task state changes
#[derive(Debug, Clone)]
pub struct TaskStateNotifier {
    sender: broadcast::Sender<TaskInfo>,
}

impl TaskStateNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn notify(&self, task: TaskInfo) {
        // No receivers is not an error
        let _ = self.sender.send(task);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskInfo> {
        self.sender.subscribe()
    }
}

impl Default for TaskStateNotifier {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Durable task records, grouped by source application
pub trait TaskStore: Send + Sync {
    fn tasks(
        &self,
        source_app_name: &str,
        states: &[TaskState],
        skip_stale_check: bool,
    ) -> Vec<TaskInfo>;

    fn task(&self, source_app_name: &str, task_id: &str) -> Option<TaskInfo>;

    /// Raw write; callers go through [`TaskStore::update_task`]
    fn write_task(&self, source_app_name: &str, task_id: &str, info: &TaskInfo) -> bool;

    fn delete_task(&self, source_app_name: &str, task_id: &str) -> bool;

    /// Delete every task matching `predicate`, returning how many went
    fn cleanup_tasks(&self, predicate: &dyn Fn(&TaskInfo) -> bool) -> usize;

    fn notifier(&self) -> &TaskStateNotifier;

    /// Write a task and broadcast it if its state changed
    fn update_task(&self, source_app_name: &str, task_id: &str, info: &TaskInfo) -> bool {
        let previous = self.task(source_app_name, task_id).map(|t| t.state);
        if !self.write_task(source_app_name, task_id, info) {
            return false;
        }
        if previous != Some(info.state) {
            info!(
                source_app = %source_app_name,
                task_id = %task_id,
                old_state = ?previous,
                new_state = %info.state,
                "Task state changed"
            );
            self.notifier().notify(info.clone());
        }
        true
    }

    fn subscribe_state_changes(&self) -> broadcast::Receiver<TaskInfo> {
        self.notifier().subscribe()
    }
}

/// Free resource inventory of the cluster
pub trait ClusterResourcesStore: Send + Sync {
    fn current_snapshot(&self, include_blacklisted: bool) -> Vec<ExecutorResourceSnapshot>;

    fn executor_count(&self, include_blacklisted: bool) -> usize {
        self.current_snapshot(include_blacklisted).len()
    }
}
