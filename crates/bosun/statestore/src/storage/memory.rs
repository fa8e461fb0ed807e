//! In-memory implementations of the durable store traits
//!
//! These back tests and single-node development. Writes always succeed.

use super::traits::{
    is_stale, ApplicationStateStore, ClusterResourcesStore, InstanceInfoStore,
    LocalServiceStateStore, TaskStateNotifier, TaskStore,
};
use bosun_types::{
    ApplicationInfo, DeployableId, ExecutorId, ExecutorResourceSnapshot, InstanceId, InstanceInfo,
    InstanceState, LocalServiceInfo, LocalServiceInstanceInfo, TaskInfo, TaskState,
};
use chrono::Utc;
use dashmap::DashMap;
use std::collections::BTreeMap;

/// In-memory application records
#[derive(Default)]
pub struct InMemoryApplicationStore {
    apps: DashMap<DeployableId, ApplicationInfo>,
}

impl InMemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ApplicationStateStore for InMemoryApplicationStore {
    fn applications(&self) -> Vec<ApplicationInfo> {
        let mut apps: Vec<ApplicationInfo> = self.apps.iter().map(|e| e.value().clone()).collect();
        apps.sort_by(|a, b| a.app_id.cmp(&b.app_id));
        apps
    }

    fn application(&self, app_id: &DeployableId) -> Option<ApplicationInfo> {
        self.apps.get(app_id).map(|a| a.clone())
    }

    fn update_application_state(&self, app_id: &DeployableId, info: &ApplicationInfo) -> bool {
        self.apps.insert(app_id.clone(), info.clone());
        true
    }

    fn delete_application_state(&self, app_id: &DeployableId) -> bool {
        self.apps.remove(app_id);
        true
    }
}

/// Mark stale active entries of one group LOST
fn mark_stale<T>(
    entries: &mut BTreeMap<InstanceId, T>,
    state: impl Fn(&T) -> (InstanceState, chrono::DateTime<Utc>),
    lost: impl Fn(&T) -> T,
) -> usize {
    let mut marked = 0;
    for entry in entries.values_mut() {
        let (current, updated) = state(entry);
        if current.is_active() && is_stale(updated) {
            *entry = lost(entry);
            marked += 1;
        }
    }
    marked
}

/// In-memory application instance records
#[derive(Default)]
pub struct InMemoryInstanceStore {
    instances: DashMap<DeployableId, BTreeMap<InstanceId, InstanceInfo>>,
}

impl InMemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InstanceInfoStore for InMemoryInstanceStore {
    fn instances(
        &self,
        app_id: &DeployableId,
        states: &[InstanceState],
        skip_stale_check: bool,
    ) -> Vec<InstanceInfo> {
        self.instances
            .get(app_id)
            .map(|group| {
                group
                    .values()
                    .filter(|i| states.contains(&i.state))
                    .filter(|i| skip_stale_check || !is_stale(i.updated))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn instance(&self, app_id: &DeployableId, instance_id: &InstanceId) -> Option<InstanceInfo> {
        self.instances
            .get(app_id)
            .and_then(|group| group.get(instance_id).cloned())
    }

    fn update_instance_state(
        &self,
        app_id: &DeployableId,
        instance_id: &InstanceId,
        info: &InstanceInfo,
    ) -> bool {
        self.instances
            .entry(app_id.clone())
            .or_default()
            .insert(instance_id.clone(), info.clone());
        true
    }

    fn delete_instance_state(&self, app_id: &DeployableId, instance_id: &InstanceId) -> bool {
        if let Some(mut group) = self.instances.get_mut(app_id) {
            group.remove(instance_id);
        }
        true
    }

    fn delete_all_instance_states(&self, app_id: &DeployableId) -> bool {
        self.instances.remove(app_id);
        true
    }

    fn mark_stale_instances(&self, app_id: &DeployableId) -> usize {
        match self.instances.get_mut(app_id) {
            Some(mut group) => mark_stale(
                &mut group,
                |i| (i.state, i.updated),
                |i| i.with_state(InstanceState::Lost, Some("Instance lost".to_string())),
            ),
            None => 0,
        }
    }
}

/// In-memory local service and local service instance records
#[derive(Default)]
pub struct InMemoryLocalServiceStore {
    services: DashMap<DeployableId, LocalServiceInfo>,
    instances: DashMap<DeployableId, BTreeMap<InstanceId, LocalServiceInstanceInfo>>,
}

impl InMemoryLocalServiceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalServiceStateStore for InMemoryLocalServiceStore {
    fn services(&self) -> Vec<LocalServiceInfo> {
        let mut services: Vec<LocalServiceInfo> =
            self.services.iter().map(|e| e.value().clone()).collect();
        services.sort_by(|a, b| a.service_id.cmp(&b.service_id));
        services
    }

    fn service(&self, service_id: &DeployableId) -> Option<LocalServiceInfo> {
        self.services.get(service_id).map(|s| s.clone())
    }

    fn update_service(&self, service_id: &DeployableId, info: &LocalServiceInfo) -> bool {
        self.services.insert(service_id.clone(), info.clone());
        true
    }

    fn delete_service(&self, service_id: &DeployableId) -> bool {
        self.services.remove(service_id);
        true
    }

    fn instances(
        &self,
        service_id: &DeployableId,
        states: &[InstanceState],
        skip_stale_check: bool,
    ) -> Vec<LocalServiceInstanceInfo> {
        self.instances
            .get(service_id)
            .map(|group| {
                group
                    .values()
                    .filter(|i| states.contains(&i.state))
                    .filter(|i| skip_stale_check || !is_stale(i.updated))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn instance(
        &self,
        service_id: &DeployableId,
        instance_id: &InstanceId,
    ) -> Option<LocalServiceInstanceInfo> {
        self.instances
            .get(service_id)
            .and_then(|group| group.get(instance_id).cloned())
    }

    fn update_instance(
        &self,
        service_id: &DeployableId,
        instance_id: &InstanceId,
        info: &LocalServiceInstanceInfo,
    ) -> bool {
        self.instances
            .entry(service_id.clone())
            .or_default()
            .insert(instance_id.clone(), info.clone());
        true
    }

    fn delete_instance(&self, service_id: &DeployableId, instance_id: &InstanceId) -> bool {
        if let Some(mut group) = self.instances.get_mut(service_id) {
            group.remove(instance_id);
        }
        true
    }

    fn delete_all_instances(&self, service_id: &DeployableId) -> bool {
        self.instances.remove(service_id);
        true
    }

    fn mark_stale_instances(&self, service_id: &DeployableId) -> usize {
        match self.instances.get_mut(service_id) {
            Some(mut group) => mark_stale(
                &mut group,
                |i| (i.state, i.updated),
                |i| i.with_state(InstanceState::Lost, Some("Instance lost".to_string())),
            ),
            None => 0,
        }
    }
}

/// In-memory task records
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: DashMap<String, BTreeMap<String, TaskInfo>>,
    notifier: TaskStateNotifier,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for InMemoryTaskStore {
    fn tasks(
        &self,
        source_app_name: &str,
        states: &[TaskState],
        skip_stale_check: bool,
    ) -> Vec<TaskInfo> {
        self.tasks
            .get(source_app_name)
            .map(|group| {
                group
                    .values()
                    .filter(|t| states.contains(&t.state))
                    .filter(|t| skip_stale_check || !is_stale(t.updated))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn task(&self, source_app_name: &str, task_id: &str) -> Option<TaskInfo> {
        self.tasks
            .get(source_app_name)
            .and_then(|group| group.get(task_id).cloned())
    }

    fn write_task(&self, source_app_name: &str, task_id: &str, info: &TaskInfo) -> bool {
        self.tasks
            .entry(source_app_name.to_string())
            .or_default()
            .insert(task_id.to_string(), info.clone());
        true
    }

    fn delete_task(&self, source_app_name: &str, task_id: &str) -> bool {
        if let Some(mut group) = self.tasks.get_mut(source_app_name) {
            group.remove(task_id);
        }
        true
    }

    fn cleanup_tasks(&self, predicate: &dyn Fn(&TaskInfo) -> bool) -> usize {
        let mut removed = 0;
        for mut group in self.tasks.iter_mut() {
            let before = group.len();
            group.retain(|_, task| !predicate(task));
            removed += before - group.len();
        }
        removed
    }

    fn notifier(&self) -> &TaskStateNotifier {
        &self.notifier
    }
}

/// In-memory executor inventory
#[derive(Default)]
pub struct InMemoryClusterResources {
    executors: DashMap<ExecutorId, ExecutorResourceSnapshot>,
}

impl InMemoryClusterResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_executor(&self, snapshot: ExecutorResourceSnapshot) {
        self.executors.insert(snapshot.executor_id.clone(), snapshot);
    }

    pub fn remove_executor(&self, executor_id: &ExecutorId) {
        self.executors.remove(executor_id);
    }
}

impl ClusterResourcesStore for InMemoryClusterResources {
    fn current_snapshot(&self, include_blacklisted: bool) -> Vec<ExecutorResourceSnapshot> {
        let mut snapshots: Vec<ExecutorResourceSnapshot> = self
            .executors
            .iter()
            .filter(|e| include_blacklisted || !e.blacklisted)
            .map(|e| e.value().clone())
            .collect();
        snapshots.sort_by(|a, b| a.executor_id.cmp(&b.executor_id));
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bosun_types::{ApplicationSpec, Executable};
    use chrono::Duration;

    fn instance(app: &str, id: &str, state: InstanceState, age_secs: i64) -> InstanceInfo {
        let updated = Utc::now() - Duration::seconds(age_secs);
        InstanceInfo {
            app_id: DeployableId::new(app),
            app_name: app.to_string(),
            instance_id: InstanceId::new(id),
            executor_id: ExecutorId::new("ex-1"),
            hostname: "host-1".to_string(),
            resources: vec![],
            state,
            error_message: None,
            created: updated,
            updated,
        }
    }

    #[test]
    fn test_application_roundtrip() {
        let store = InMemoryApplicationStore::new();
        let spec = ApplicationSpec::new("web", "1", Executable::docker("nginx"));
        let info = ApplicationInfo::new(spec, 2);

        assert!(store.update_application_state(&info.app_id, &info));
        assert_eq!(store.application(&info.app_id), Some(info.clone()));
        assert_eq!(store.applications().len(), 1);

        assert!(store.delete_application_state(&info.app_id));
        assert!(store.application(&info.app_id).is_none());
    }

    #[test]
    fn test_stale_instances_filtered_and_marked() {
        let store = InMemoryInstanceStore::new();
        let app = DeployableId::new("web-1");
        let fresh = instance("web-1", "i-1", InstanceState::Healthy, 0);
        let stale = instance("web-1", "i-2", InstanceState::Healthy, 120);
        store.update_instance_state(&app, &fresh.instance_id, &fresh);
        store.update_instance_state(&app, &stale.instance_id, &stale);

        assert_eq!(store.healthy_instances(&app).len(), 1);
        assert_eq!(
            store
                .instances(&app, &[InstanceState::Healthy], true)
                .len(),
            2
        );

        assert_eq!(store.mark_stale_instances(&app), 1);
        let lost = store.instance(&app, &stale.instance_id).unwrap();
        assert_eq!(lost.state, InstanceState::Lost);
        assert_eq!(store.mark_stale_instances(&app), 0);
    }

    #[tokio::test]
    async fn test_task_update_broadcasts_state_change() {
        let store = InMemoryTaskStore::new();
        let mut rx = store.subscribe_state_changes();
        let now = Utc::now();
        let task = TaskInfo {
            source_app_name: "app".to_string(),
            task_id: "t1".to_string(),
            instance_id: InstanceId::new("TI-1"),
            executor_id: ExecutorId::new("ex-1"),
            hostname: "host-1".to_string(),
            resources: vec![],
            state: TaskState::Pending,
            result: None,
            error_message: None,
            created: now,
            updated: now,
        };

        assert!(store.update_task("app", "t1", &task));
        assert_eq!(rx.recv().await.unwrap().state, TaskState::Pending);

        // Same state again is not broadcast
        assert!(store.update_task("app", "t1", &task));
        assert!(rx.try_recv().is_err());

        let removed = store.cleanup_tasks(&|t| t.task_id == "t1");
        assert_eq!(removed, 1);
        assert!(store.task("app", "t1").is_none());
    }

    #[test]
    fn test_blacklisted_executors_excluded() {
        let resources = InMemoryClusterResources::new();
        let mut snapshot = ExecutorResourceSnapshot {
            executor_id: ExecutorId::new("ex-1"),
            hostname: "host-1".to_string(),
            free_cores: Default::default(),
            free_memory: Default::default(),
            layout: None,
            blacklisted: false,
        };
        resources.add_executor(snapshot.clone());
        snapshot.executor_id = ExecutorId::new("ex-2");
        snapshot.blacklisted = true;
        resources.add_executor(snapshot);

        assert_eq!(resources.executor_count(false), 1);
        assert_eq!(resources.executor_count(true), 2);
    }
}
