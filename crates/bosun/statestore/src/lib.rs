//! Bosun State Store - Durable store contracts and caching proxies
//!
//! The engines read cluster state far more often than they write it. Every
//! durable store is therefore fronted by a read-through proxy that loads
//! lazily, records known-empty ids, and writes through to the durable store
//! before touching its own copy.
//!
//! ## Layout
//!
//! - [`storage`]: synchronous store traits plus in-memory backends
//! - [`proxy`]: the four caching proxies
//! - [`LeadershipObserver`]: purges every proxy when leadership flips
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use bosun_statestore::{
//!     ApplicationStateStore, CachingProxyApplicationStore, InMemoryApplicationStore,
//!     LeadershipObserver,
//! };
//! use bosun_types::{ApplicationInfo, ApplicationSpec, Executable};
//!
//! let leadership = LeadershipObserver::new(true);
//! let apps = CachingProxyApplicationStore::new(
//!     Arc::new(InMemoryApplicationStore::new()),
//!     &leadership,
//! );
//!
//! let info = ApplicationInfo::new(ApplicationSpec::new("web", "1", Executable::docker("nginx")), 3);
//! assert!(apps.update_application_state(&info.app_id, &info));
//! assert_eq!(apps.application(&info.app_id).map(|a| a.instances), Some(3));
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

mod cache;
pub mod leadership;
pub mod proxy;
pub mod storage;

// Re-exports
pub use leadership::LeadershipObserver;
pub use proxy::{
    CachingProxyApplicationStore, CachingProxyInstanceStore, CachingProxyLocalServiceStore,
    CachingProxyTaskStore,
};
pub use storage::{
    is_stale, stale_instance_age, ApplicationStateStore, ClusterResourcesStore,
    InMemoryApplicationStore, InMemoryClusterResources, InMemoryInstanceStore,
    InMemoryLocalServiceStore, InMemoryTaskStore, InstanceInfoStore, LocalServiceStateStore,
    TaskStateNotifier, TaskStore,
};
