//! Caching proxy for application records

use super::KeyedEntries;
use crate::cache::CacheLock;
use crate::leadership::LeadershipObserver;
use crate::storage::ApplicationStateStore;
use bosun_types::{ApplicationInfo, DeployableId};
use std::sync::Arc;
use tracing::debug;

pub struct CachingProxyApplicationStore {
    root: Arc<dyn ApplicationStateStore>,
    cache: CacheLock<KeyedEntries<ApplicationInfo>>,
}

impl CachingProxyApplicationStore {
    /// Wrap `root`; the cache is purged on every leadership change
    pub fn new(root: Arc<dyn ApplicationStateStore>, leadership: &LeadershipObserver) -> Arc<Self> {
        let proxy = Arc::new(Self {
            root,
            cache: CacheLock::new(KeyedEntries::default()),
        });
        let weak = Arc::downgrade(&proxy);
        leadership.on_change(move |leader| {
            if let Some(proxy) = weak.upgrade() {
                debug!(leader, "Purging application cache");
                proxy.invalidate_all();
            }
        });
        proxy
    }

    pub fn invalidate_all(&self) {
        self.cache.write(|cache| cache.clear());
    }
}

impl ApplicationStateStore for CachingProxyApplicationStore {
    fn applications(&self) -> Vec<ApplicationInfo> {
        self.cache.read_through(
            |cache| cache.is_complete(),
            |cache| {
                let apps = self.root.applications();
                cache.fill(apps.into_iter().map(|a| (a.app_id.clone(), a)));
            },
            |cache| cache.values(),
        )
    }

    fn application(&self, app_id: &DeployableId) -> Option<ApplicationInfo> {
        self.cache.read_through(
            |cache| cache.contains(app_id),
            |cache| cache.set(app_id.clone(), self.root.application(app_id)),
            |cache| cache.get(app_id),
        )
    }

    fn update_application_state(&self, app_id: &DeployableId, info: &ApplicationInfo) -> bool {
        self.cache.write(|cache| {
            if !self.root.update_application_state(app_id, info) {
                return false;
            }
            cache.set(app_id.clone(), Some(info.clone()));
            true
        })
    }

    fn delete_application_state(&self, app_id: &DeployableId) -> bool {
        self.cache.write(|cache| {
            if !self.root.delete_application_state(app_id) {
                return false;
            }
            cache.set(app_id.clone(), None);
            true
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryApplicationStore;
    use bosun_types::{ApplicationSpec, Executable};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingStore {
        inner: InMemoryApplicationStore,
        reads: AtomicUsize,
        reject_writes: AtomicBool,
    }

    impl ApplicationStateStore for CountingStore {
        fn applications(&self) -> Vec<ApplicationInfo> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.applications()
        }

        fn application(&self, app_id: &DeployableId) -> Option<ApplicationInfo> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.application(app_id)
        }

        fn update_application_state(&self, app_id: &DeployableId, info: &ApplicationInfo) -> bool {
            !self.reject_writes.load(Ordering::SeqCst)
                && self.inner.update_application_state(app_id, info)
        }

        fn delete_application_state(&self, app_id: &DeployableId) -> bool {
            !self.reject_writes.load(Ordering::SeqCst)
                && self.inner.delete_application_state(app_id)
        }
    }

    fn app(name: &str, instances: u64) -> ApplicationInfo {
        ApplicationInfo::new(
            ApplicationSpec::new(name, "1", Executable::docker("nginx")),
            instances,
        )
    }

    #[test]
    fn test_write_visible_to_next_read() {
        let root = Arc::new(CountingStore::default());
        let leadership = LeadershipObserver::new(true);
        let proxy = CachingProxyApplicationStore::new(root.clone(), &leadership);

        let info = app("web", 2);
        assert!(proxy.update_application_state(&info.app_id, &info));
        assert_eq!(proxy.application(&info.app_id), Some(info.clone()));

        let scaled = info.with_instances(5);
        assert!(proxy.update_application_state(&info.app_id, &scaled));
        assert_eq!(proxy.application(&info.app_id).map(|a| a.instances), Some(5));
        assert_eq!(root.reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_known_empty_is_not_reloaded() {
        let root = Arc::new(CountingStore::default());
        let leadership = LeadershipObserver::new(true);
        let proxy = CachingProxyApplicationStore::new(root.clone(), &leadership);
        let missing = DeployableId::new("missing-1");

        assert!(proxy.application(&missing).is_none());
        assert!(proxy.application(&missing).is_none());
        assert_eq!(root.reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_durable_write_leaves_cache_untouched() {
        let root = Arc::new(CountingStore::default());
        let leadership = LeadershipObserver::new(true);
        let proxy = CachingProxyApplicationStore::new(root.clone(), &leadership);

        let info = app("web", 2);
        proxy.update_application_state(&info.app_id, &info);

        root.reject_writes.store(true, Ordering::SeqCst);
        assert!(!proxy.update_application_state(&info.app_id, &info.with_instances(9)));
        assert!(!proxy.delete_application_state(&info.app_id));
        assert_eq!(proxy.application(&info.app_id).map(|a| a.instances), Some(2));
    }

    #[test]
    fn test_leadership_flip_purges_cache() {
        let root = Arc::new(CountingStore::default());
        let leadership = LeadershipObserver::new(true);
        let proxy = CachingProxyApplicationStore::new(root.clone(), &leadership);

        let info = app("web", 2);
        proxy.update_application_state(&info.app_id, &info);

        // Out-of-band durable change, invisible until the purge
        root.inner
            .update_application_state(&info.app_id, &info.with_instances(7));
        assert_eq!(proxy.application(&info.app_id).map(|a| a.instances), Some(2));

        leadership.set_leader(false);
        assert_eq!(proxy.application(&info.app_id).map(|a| a.instances), Some(7));
    }

    #[test]
    fn test_full_listing_loads_once() {
        let root = Arc::new(CountingStore::default());
        for name in ["b", "a", "c"] {
            let info = app(name, 1);
            root.inner.update_application_state(&info.app_id, &info);
        }
        let leadership = LeadershipObserver::new(true);
        let proxy = CachingProxyApplicationStore::new(root.clone(), &leadership);

        let ids: Vec<String> = proxy
            .applications()
            .into_iter()
            .map(|a| a.app_id.to_string())
            .collect();
        assert_eq!(ids, vec!["a-1", "b-1", "c-1"]);

        proxy.applications();
        assert!(proxy.application(&DeployableId::new("a-1")).is_some());
        assert!(proxy.application(&DeployableId::new("zzz-1")).is_none());
        assert_eq!(root.reads.load(Ordering::SeqCst), 1);
    }
}
