//! Caching proxy for application instance records
//!
//! Groups are loaded per application with every state and no staleness
//! filter; reads apply both filters on the way out.

use super::GroupedEntries;
use crate::cache::CacheLock;
use crate::leadership::LeadershipObserver;
use crate::storage::{is_stale, InstanceInfoStore};
use bosun_types::{DeployableId, InstanceId, InstanceInfo, InstanceState};
use std::sync::Arc;
use tracing::debug;

type InstanceGroups = GroupedEntries<DeployableId, InstanceId, InstanceInfo>;

pub struct CachingProxyInstanceStore {
    root: Arc<dyn InstanceInfoStore>,
    cache: CacheLock<InstanceGroups>,
}

impl CachingProxyInstanceStore {
    pub fn new(root: Arc<dyn InstanceInfoStore>, leadership: &LeadershipObserver) -> Arc<Self> {
        let proxy = Arc::new(Self {
            root,
            cache: CacheLock::new(GroupedEntries::default()),
        });
        let weak = Arc::downgrade(&proxy);
        leadership.on_change(move |leader| {
            if let Some(proxy) = weak.upgrade() {
                debug!(leader, "Purging instance cache");
                proxy.invalidate_all();
            }
        });
        proxy
    }

    pub fn invalidate_all(&self) {
        self.cache.write(|cache| cache.clear());
    }

    fn reload(&self, cache: &mut InstanceGroups, app_id: &DeployableId) {
        let instances = self.root.instances(app_id, InstanceState::ALL, true);
        cache.replace(
            app_id.clone(),
            instances.into_iter().map(|i| (i.instance_id.clone(), i)),
        );
    }
}

impl InstanceInfoStore for CachingProxyInstanceStore {
    fn instances(
        &self,
        app_id: &DeployableId,
        states: &[InstanceState],
        skip_stale_check: bool,
    ) -> Vec<InstanceInfo> {
        self.cache.read_through(
            |cache| cache.contains(app_id),
            |cache| self.reload(cache, app_id),
            |cache| {
                cache
                    .group(app_id)
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

    fn instance(&self, app_id: &DeployableId, instance_id: &InstanceId) -> Option<InstanceInfo> {
        self.cache.read_through(
            |cache| cache.contains(app_id),
            |cache| self.reload(cache, app_id),
            |cache| cache.get(app_id, instance_id).cloned(),
        )
    }

    fn update_instance_state(
        &self,
        app_id: &DeployableId,
        instance_id: &InstanceId,
        info: &InstanceInfo,
    ) -> bool {
        self.cache.write(|cache| {
            if !self.root.update_instance_state(app_id, instance_id, info) {
                return false;
            }
            self.reload(cache, app_id);
            true
        })
    }

    fn delete_instance_state(&self, app_id: &DeployableId, instance_id: &InstanceId) -> bool {
        self.cache.write(|cache| {
            if !self.root.delete_instance_state(app_id, instance_id) {
                return false;
            }
            cache.remove(app_id, instance_id);
            true
        })
    }

    fn delete_all_instance_states(&self, app_id: &DeployableId) -> bool {
        self.cache.write(|cache| {
            if !self.root.delete_all_instance_states(app_id) {
                return false;
            }
            cache.replace(app_id.clone(), Vec::new());
            true
        })
    }

    fn mark_stale_instances(&self, app_id: &DeployableId) -> usize {
        self.cache.write(|cache| {
            let marked = self.root.mark_stale_instances(app_id);
            if marked > 0 {
                debug!(app_id = %app_id, marked, "Marked stale instances lost");
                self.reload(cache, app_id);
            }
            marked
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryInstanceStore;
    use bosun_types::ExecutorId;
    use chrono::{Duration, Utc};

    fn instance(app: &DeployableId, id: &str, state: InstanceState, age_secs: i64) -> InstanceInfo {
        let updated = Utc::now() - Duration::seconds(age_secs);
        InstanceInfo {
            app_id: app.clone(),
            app_name: "web".to_string(),
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

    fn setup() -> (Arc<InMemoryInstanceStore>, LeadershipObserver, Arc<CachingProxyInstanceStore>) {
        let root = Arc::new(InMemoryInstanceStore::new());
        let leadership = LeadershipObserver::new(true);
        let proxy = CachingProxyInstanceStore::new(root.clone(), &leadership);
        (root, leadership, proxy)
    }

    #[test]
    fn test_update_visible_through_proxy() {
        let (_root, _leadership, proxy) = setup();
        let app = DeployableId::new("web-1");

        // Prime the group as empty first
        assert!(proxy.active_instances(&app).is_empty());

        let info = instance(&app, "i-1", InstanceState::Pending, 0);
        assert!(proxy.update_instance_state(&app, &info.instance_id, &info));
        assert_eq!(proxy.active_instances(&app).len(), 1);

        let healthy = info.with_state(InstanceState::Healthy, None);
        proxy.update_instance_state(&app, &info.instance_id, &healthy);
        assert_eq!(proxy.healthy_instances(&app), vec![healthy]);
    }

    #[test]
    fn test_stale_instances_hidden_unless_requested() {
        let (root, _leadership, proxy) = setup();
        let app = DeployableId::new("web-1");
        let stale = instance(&app, "i-1", InstanceState::Healthy, 90);
        root.update_instance_state(&app, &stale.instance_id, &stale);

        assert!(proxy.healthy_instances(&app).is_empty());
        assert_eq!(proxy.instances(&app, &[InstanceState::Healthy], true).len(), 1);
        assert!(proxy.instance(&app, &stale.instance_id).is_some());
    }

    #[test]
    fn test_mark_stale_refreshes_group() {
        let (root, _leadership, proxy) = setup();
        let app = DeployableId::new("web-1");
        let stale = instance(&app, "i-1", InstanceState::Healthy, 90);
        root.update_instance_state(&app, &stale.instance_id, &stale);

        assert_eq!(proxy.mark_stale_instances(&app), 1);
        assert_eq!(
            proxy.instance(&app, &stale.instance_id).map(|i| i.state),
            Some(InstanceState::Lost)
        );
    }

    #[test]
    fn test_delete_all_and_leadership_purge() {
        let (root, leadership, proxy) = setup();
        let app = DeployableId::new("web-1");
        let info = instance(&app, "i-1", InstanceState::Healthy, 0);
        proxy.update_instance_state(&app, &info.instance_id, &info);

        assert!(proxy.delete_all_instance_states(&app));
        assert!(proxy.active_instances(&app).is_empty());

        // Written behind the proxy's back
        root.update_instance_state(&app, &info.instance_id, &info);
        assert!(proxy.active_instances(&app).is_empty());

        leadership.set_leader(false);
        assert_eq!(proxy.active_instances(&app).len(), 1);
    }
}
