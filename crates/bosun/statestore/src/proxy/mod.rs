//! Read-through caching proxies over the durable stores
//!
//! Every proxy implements the same trait as the store it wraps, so callers
//! never know whether they talk to the cache. Writes go to the durable
//! store first and touch the cache only when the durable write succeeded.
//! All cached content is dropped whenever leadership flips.

mod application;
mod instance;
mod local_service;
mod task;

pub use application::CachingProxyApplicationStore;
pub use instance::CachingProxyInstanceStore;
pub use local_service::CachingProxyLocalServiceStore;
pub use task::CachingProxyTaskStore;

use bosun_types::DeployableId;
use std::borrow::Borrow;
use std::collections::BTreeMap;

/// Top level records keyed by deployable id
///
/// `None` marks an id known to have no record. `complete` is set once the
/// whole collection has been loaded.
pub(crate) struct KeyedEntries<V> {
    entries: BTreeMap<DeployableId, Option<V>>,
    complete: bool,
}

impl<V> Default for KeyedEntries<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            complete: false,
        }
    }
}

impl<V: Clone> KeyedEntries<V> {
    pub(crate) fn is_complete(&self) -> bool {
        self.complete
    }

    pub(crate) fn contains(&self, id: &DeployableId) -> bool {
        self.complete || self.entries.contains_key(id)
    }

    pub(crate) fn get(&self, id: &DeployableId) -> Option<V> {
        self.entries.get(id).cloned().flatten()
    }

    pub(crate) fn values(&self) -> Vec<V> {
        self.entries.values().flatten().cloned().collect()
    }

    pub(crate) fn fill(&mut self, items: impl IntoIterator<Item = (DeployableId, V)>) {
        self.entries = items.into_iter().map(|(id, v)| (id, Some(v))).collect();
        self.complete = true;
    }

    pub(crate) fn set(&mut self, id: DeployableId, value: Option<V>) {
        self.entries.insert(id, value);
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.complete = false;
    }
}

/// Child records grouped by owner; a loaded owner may have an empty group
pub(crate) struct GroupedEntries<G, K, V> {
    groups: BTreeMap<G, BTreeMap<K, V>>,
}

impl<G, K, V> Default for GroupedEntries<G, K, V> {
    fn default() -> Self {
        Self {
            groups: BTreeMap::new(),
        }
    }
}

impl<G: Ord, K: Ord, V> GroupedEntries<G, K, V> {
    pub(crate) fn contains<Q>(&self, group: &Q) -> bool
    where
        G: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.groups.contains_key(group)
    }

    pub(crate) fn group<Q>(&self, group: &Q) -> Option<&BTreeMap<K, V>>
    where
        G: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.groups.get(group)
    }

    pub(crate) fn get<Q, R>(&self, group: &Q, key: &R) -> Option<&V>
    where
        G: Borrow<Q>,
        K: Borrow<R>,
        Q: Ord + ?Sized,
        R: Ord + ?Sized,
    {
        self.groups.get(group).and_then(|g| g.get(key))
    }

    pub(crate) fn replace(&mut self, group: G, items: impl IntoIterator<Item = (K, V)>) {
        self.groups.insert(group, items.into_iter().collect());
    }

    /// Insert into an already loaded group; returns false if it is not loaded
    pub(crate) fn insert<Q>(&mut self, group: &Q, key: K, value: V) -> bool
    where
        G: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match self.groups.get_mut(group) {
            Some(entries) => {
                entries.insert(key, value);
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove<Q, R>(&mut self, group: &Q, key: &R)
    where
        G: Borrow<Q>,
        K: Borrow<R>,
        Q: Ord + ?Sized,
        R: Ord + ?Sized,
    {
        if let Some(entries) = self.groups.get_mut(group) {
            entries.remove(key);
        }
    }

    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&V) -> bool) {
        for entries in self.groups.values_mut() {
            entries.retain(|_, v| keep(v));
        }
    }

    pub(crate) fn clear(&mut self) {
        self.groups.clear();
    }
}
