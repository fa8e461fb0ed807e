//! Caching proxy for task records
//!
//! Updates carrying an `updated` timestamp older than the cached record are
//! dropped, so a late report never overwrites a newer state.

use super::GroupedEntries;
use crate::cache::CacheLock;
use crate::leadership::LeadershipObserver;
use crate::storage::{is_stale, TaskStateNotifier, TaskStore};
use bosun_types::{TaskInfo, TaskState};
use std::sync::Arc;
use tracing::{debug, warn};

type TaskGroups = GroupedEntries<String, String, TaskInfo>;

pub struct CachingProxyTaskStore {
    root: Arc<dyn TaskStore>,
    cache: CacheLock<TaskGroups>,
    notifier: TaskStateNotifier,
}

impl CachingProxyTaskStore {
    pub fn new(root: Arc<dyn TaskStore>, leadership: &LeadershipObserver) -> Arc<Self> {
        let proxy = Arc::new(Self {
            root,
            cache: CacheLock::new(GroupedEntries::default()),
            notifier: TaskStateNotifier::default(),
        });
        let weak = Arc::downgrade(&proxy);
        leadership.on_change(move |leader| {
            if let Some(proxy) = weak.upgrade() {
                debug!(leader, "Purging task cache");
                proxy.invalidate_all();
            }
        });
        proxy
    }

    pub fn invalidate_all(&self) {
        self.cache.write(|cache| cache.clear());
    }

    fn reload(&self, cache: &mut TaskGroups, source_app_name: &str) {
        let tasks = self.root.tasks(source_app_name, TaskState::ALL, true);
        cache.replace(
            source_app_name.to_string(),
            tasks.into_iter().map(|t| (t.task_id.clone(), t)),
        );
    }
}

impl TaskStore for CachingProxyTaskStore {
    fn tasks(
        &self,
        source_app_name: &str,
        states: &[TaskState],
        skip_stale_check: bool,
    ) -> Vec<TaskInfo> {
        self.cache.read_through(
            |cache| cache.contains(source_app_name),
            |cache| self.reload(cache, source_app_name),
            |cache| {
                cache
                    .group(source_app_name)
                    .map(|group| {
                        group
                            .values()
                            .filter(|t| states.contains(&t.state))
                            .filter(|t| skip_stale_check || !is_stale(t.updated))
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default()
            },
        )
    }

    fn task(&self, source_app_name: &str, task_id: &str) -> Option<TaskInfo> {
        self.cache.read_through(
            |cache| cache.contains(source_app_name),
            |cache| self.reload(cache, source_app_name),
            |cache| cache.get(source_app_name, task_id).cloned(),
        )
    }

    fn write_task(&self, source_app_name: &str, task_id: &str, info: &TaskInfo) -> bool {
        self.cache.write(|cache| {
            if !cache.contains(source_app_name) {
                self.reload(cache, source_app_name);
            }
            if let Some(existing) = cache.get(source_app_name, task_id) {
                if existing.updated > info.updated {
                    warn!(
                        source_app = %source_app_name,
                        task_id = %task_id,
                        existing = %existing.updated,
                        received = %info.updated,
                        "Ignoring stale task update"
                    );
                    return false;
                }
            }
            if !self.root.write_task(source_app_name, task_id, info) {
                return false;
            }
            cache.insert(source_app_name, task_id.to_string(), info.clone());
            true
        })
    }

    fn delete_task(&self, source_app_name: &str, task_id: &str) -> bool {
        self.cache.write(|cache| {
            if !self.root.delete_task(source_app_name, task_id) {
                return false;
            }
            cache.remove(source_app_name, task_id);
            true
        })
    }

    fn cleanup_tasks(&self, predicate: &dyn Fn(&TaskInfo) -> bool) -> usize {
        self.cache.write(|cache| {
            let removed = self.root.cleanup_tasks(predicate);
            cache.retain(|task| !predicate(task));
            removed
        })
    }

    fn notifier(&self) -> &TaskStateNotifier {
        &self.notifier
    }
}
