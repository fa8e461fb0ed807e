//! Caching proxy for local services and their instances

use super::{GroupedEntries, KeyedEntries};
use crate::cache::CacheLock;
use crate::leadership::LeadershipObserver;
use crate::storage::{is_stale, LocalServiceStateStore};
use bosun_types::{DeployableId, InstanceId, InstanceState, LocalServiceInfo, LocalServiceInstanceInfo};
use std::sync::Arc;
use tracing::debug;

type ServiceInstanceGroups = GroupedEntries<DeployableId, InstanceId, LocalServiceInstanceInfo>;

pub struct CachingProxyLocalServiceStore {
    root: Arc<dyn LocalServiceStateStore>,
    services: CacheLock<KeyedEntries<LocalServiceInfo>>,
    instances: CacheLock<ServiceInstanceGroups>,
}

impl CachingProxyLocalServiceStore {
    pub fn new(root: Arc<dyn LocalServiceStateStore>, leadership: &LeadershipObserver) -> Arc<Self> {
        let proxy = Arc::new(Self {
            root,
            services: CacheLock::new(KeyedEntries::default()),
            instances: CacheLock::new(GroupedEntries::default()),
        });
        let weak = Arc::downgrade(&proxy);
        leadership.on_change(move |leader| {
            if let Some(proxy) = weak.upgrade() {
                debug!(leader, "Purging local service cache");
                proxy.invalidate_all();
            }
        });
        proxy
    }

    pub fn invalidate_all(&self) {
        self.services.write(|cache| cache.clear());
        self.instances.write(|cache| cache.clear());
    }

    fn reload_instances(&self, cache: &mut ServiceInstanceGroups, service_id: &DeployableId) {
        let instances = self.root.instances(service_id, InstanceState::ALL, true);
        cache.replace(
            service_id.clone(),
            instances.into_iter().map(|i| (i.instance_id.clone(), i)),
        );
    }
}

impl LocalServiceStateStore for CachingProxyLocalServiceStore {
    fn services(&self) -> Vec<LocalServiceInfo> {
        self.services.read_through(
            |cache| cache.is_complete(),
            |cache| {
                let services = self.root.services();
                cache.fill(services.into_iter().map(|s| (s.service_id.clone(), s)));
            },
            |cache| cache.values(),
        )
    }

    fn service(&self, service_id: &DeployableId) -> Option<LocalServiceInfo> {
        self.services.read_through(
            |cache| cache.contains(service_id),
            |cache| cache.set(service_id.clone(), self.root.service(service_id)),
            |cache| cache.get(service_id),
        )
    }

    fn update_service(&self, service_id: &DeployableId, info: &LocalServiceInfo) -> bool {
        self.services.write(|cache| {
            if !self.root.update_service(service_id, info) {
                return false;
            }
            cache.set(service_id.clone(), Some(info.clone()));
            true
        })
    }

    fn delete_service(&self, service_id: &DeployableId) -> bool {
        self.services.write(|cache| {
            if !self.root.delete_service(service_id) {
                return false;
            }
            cache.set(service_id.clone(), None);
            true
        })
    }

    fn instances(
        &self,
        service_id: &DeployableId,
        states: &[InstanceState],
        skip_stale_check: bool,
    ) -> Vec<LocalServiceInstanceInfo> {
        self.instances.read_through(
            |cache| cache.contains(service_id),
            |cache| self.reload_instances(cache, service_id),
            |cache| {
                cache
                    .group(service_id)
                    .map(|group| {
                        group
                            .values()
                            .filter(|i| states.contains(&i.state))
                            .filter(|i| skip_stale_check || !is_stale(i.updated))
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default()
            },
        )
    }

    fn instance(
        &self,
        service_id: &DeployableId,
        instance_id: &InstanceId,
    ) -> Option<LocalServiceInstanceInfo> {
        self.instances.read_through(
            |cache| cache.contains(service_id),
            |cache| self.reload_instances(cache, service_id),
            |cache| cache.get(service_id, instance_id).cloned(),
        )
    }

    fn update_instance(
        &self,
        service_id: &DeployableId,
        instance_id: &InstanceId,
        info: &LocalServiceInstanceInfo,
    ) -> bool {
        self.instances.write(|cache| {
            if !self.root.update_instance(service_id, instance_id, info) {
                return false;
            }
            self.reload_instances(cache, service_id);
            true
        })
    }

    fn delete_instance(&self, service_id: &DeployableId, instance_id: &InstanceId) -> bool {
        self.instances.write(|cache| {
            if !self.root.delete_instance(service_id, instance_id) {
                return false;
            }
            cache.remove(service_id, instance_id);
            true
        })
    }

    fn delete_all_instances(&self, service_id: &DeployableId) -> bool {
        self.instances.write(|cache| {
            if !self.root.delete_all_instances(service_id) {
                return false;
            }
            cache.replace(service_id.clone(), Vec::new());
            true
        })
    }

    fn mark_stale_instances(&self, service_id: &DeployableId) -> usize {
        self.instances.write(|cache| {
            let marked = self.root.mark_stale_instances(service_id);
            if marked > 0 {
                self.reload_instances(cache, service_id);
            }
            marked
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryLocalServiceStore;
    use bosun_types::{ActivationState, ExecutorId, Executable, LocalServiceSpec};
    use chrono::Utc;

    #[test]
    fn test_service_and_instances_through_proxy() {
        let root = Arc::new(InMemoryLocalServiceStore::new());
        let leadership = LeadershipObserver::new(true);
        let proxy = CachingProxyLocalServiceStore::new(root.clone(), &leadership);

        let info = LocalServiceInfo::new(
            LocalServiceSpec::new("agent", "2", Executable::docker("agent")),
            1,
        );
        let id = info.service_id.clone();
        assert!(proxy.service(&id).is_none());
        assert!(proxy.update_service(&id, &info));
        assert_eq!(proxy.services(), vec![info.clone()]);

        let active = info.with_activation_state(ActivationState::Active);
        proxy.update_service(&id, &active);
        assert_eq!(
            proxy.service(&id).map(|s| s.activation_state),
            Some(ActivationState::Active)
        );

        let now = Utc::now();
        let instance = LocalServiceInstanceInfo {
            service_id: id.clone(),
            service_name: "agent".to_string(),
            instance_id: InstanceId::new("SI-1"),
            executor_id: ExecutorId::new("ex-1"),
            hostname: "host-1".to_string(),
            resources: vec![],
            state: InstanceState::Healthy,
            error_message: None,
            created: now,
            updated: now,
        };
        assert!(proxy.healthy_instances(&id).is_empty());
        proxy.update_instance(&id, &instance.instance_id, &instance);
        assert_eq!(proxy.healthy_instances(&id).len(), 1);

        assert!(proxy.delete_service(&id));
        assert!(proxy.delete_all_instances(&id));
        assert!(proxy.service(&id).is_none());
        assert!(proxy.healthy_instances(&id).is_empty());
    }

    #[test]
    fn test_leadership_flip_purges_both_caches() {
        let root = Arc::new(InMemoryLocalServiceStore::new());
        let leadership = LeadershipObserver::new(false);
        let proxy = CachingProxyLocalServiceStore::new(root.clone(), &leadership);

        let info = LocalServiceInfo::new(
            LocalServiceSpec::new("agent", "2", Executable::docker("agent")),
            1,
        );
        assert!(proxy.services().is_empty());
        root.update_service(&info.service_id, &info);
        assert!(proxy.services().is_empty());

        leadership.set_leader(true);
        assert_eq!(proxy.services().len(), 1);
    }
}
