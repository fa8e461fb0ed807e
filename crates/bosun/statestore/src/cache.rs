//! Lock discipline shared by every caching proxy
//!
//! Reads first take a shared lock. When the requested keys are missing the
//! reader moves to an upgradable read, re-checks, and tries to upgrade in
//! place. If the upgrade is refused it drops the guard and queues for the
//! write lock. A reader never blocks on the write lock while it still holds
//! a read guard of the same lock.

use parking_lot::{RwLock, RwLockUpgradableReadGuard, RwLockWriteGuard};

pub(crate) struct CacheLock<T> {
    inner: RwLock<T>,
}

impl<T> CacheLock<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(value),
        }
    }

    /// Read from the cache, loading whatever `is_loaded` reports as missing
    ///
    /// `load` runs with exclusive access and only if the data is still
    /// missing once that access is held.
    pub(crate) fn read_through<R>(
        &self,
        is_loaded: impl Fn(&T) -> bool,
        load: impl FnOnce(&mut T),
        read: impl Fn(&T) -> R,
    ) -> R {
        {
            let guard = self.inner.read();
            if is_loaded(&guard) {
                return read(&guard);
            }
        }

        let guard = self.inner.upgradable_read();
        if is_loaded(&guard) {
            return read(&guard);
        }
        let mut guard = self.upgrade(guard);
        if !is_loaded(&guard) {
            load(&mut guard);
        }
        read(&guard)
    }

    /// Run a mutation under the write lock
    pub(crate) fn write<R>(&self, mutate: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.write();
        mutate(&mut guard)
    }

    fn upgrade<'a>(&'a self, guard: RwLockUpgradableReadGuard<'a, T>) -> RwLockWriteGuard<'a, T> {
        match RwLockUpgradableReadGuard::try_upgrade(guard) {
            Ok(write) => write,
            Err(guard) => {
                drop(guard);
                self.inner.write()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_loads_once_then_serves_from_memory() {
        let lock = CacheLock::new(HashMap::<u32, String>::new());
        let loads = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = lock.read_through(
                |m| m.contains_key(&1),
                |m| {
                    loads.fetch_add(1, Ordering::SeqCst);
                    m.insert(1, "one".to_string());
                },
                |m| m.get(&1).cloned(),
            );
            assert_eq!(value.as_deref(), Some("one"));
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_upgrade_with_concurrent_reader_falls_back_to_write() {
        let lock = Arc::new(CacheLock::new(Vec::<u32>::new()));
        let reader = lock.inner.read();

        let cloned = lock.clone();
        let handle = std::thread::spawn(move || {
            cloned.read_through(|v| !v.is_empty(), |v| v.push(7), |v| v[0])
        });

        std::thread::sleep(std::time::Duration::from_millis(50));
        drop(reader);
        assert_eq!(handle.join().unwrap(), 7);
    }

    #[test]
    fn test_concurrent_missing_reads_load_once() {
        let lock = Arc::new(CacheLock::new(Option::<u32>::None));
        let loads = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = lock.clone();
                let loads = loads.clone();
                std::thread::spawn(move || {
                    lock.read_through(
                        |v| v.is_some(),
                        |v| {
                            loads.fetch_add(1, Ordering::SeqCst);
                            *v = Some(42);
                        },
                        |v| v.unwrap_or_default(),
                    )
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 42);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }
}
