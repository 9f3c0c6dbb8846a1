//! # The scoped store.
//!
//! One [`Store`] exists per execution context. A child context's store
//! links to its parent's; lookups delegate upward on a local miss, writes
//! never leave the local store.
//!
//! ## Rules
//! - `get` walks local → root until found or exhausted.
//! - `put` lands locally, never mutating an ancestor's view.
//! - `get_or_compute` runs the factory at most once per (namespace, key)
//!   pair per store: the factory executes under the store's local lock.
//!   Stores are never shared between unrelated execution branches, so no
//!   cross-store synchronization exists or is needed — keep factories
//!   cheap.
//! - `close` closes owned closeable entries most-recently-inserted first;
//!   one entry failing to close does not stop the rest, failures are
//!   aggregated.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use crate::collector::FailureCollector;
use crate::error::TestFailure;
use crate::store::Namespace;

/// Type-erased value held by a [`Store`].
pub type StoredValue = Arc<dyn Any + Send + Sync>;

/// Close contract for store entries holding resources.
///
/// Entries registered via [`Store::put_resource`] are closed on store
/// teardown, most-recently-inserted first.
pub trait CloseableResource: Send + Sync {
    /// Releases the resource. A failure here is aggregated with other
    /// close failures, not swallowed.
    fn close(&self) -> Result<(), TestFailure>;
}

struct Entry {
    value: StoredValue,
    closer: Option<Arc<dyn CloseableResource>>,
    order: u64,
}

/// Namespaced key/value store with parent delegation and deterministic
/// teardown.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use testvisor::{Namespace, Store};
///
/// let parent = Store::root();
/// let ns = Namespace::global();
/// parent.put(ns.clone(), "shared", Arc::new(1_u32));
///
/// let child = Store::child_of(&parent);
/// // Child sees the parent entry...
/// assert_eq!(child.get_typed::<u32>(&ns, "shared").as_deref(), Some(&1));
/// // ...and local writes shadow without touching the parent.
/// child.put(ns.clone(), "shared", Arc::new(2_u32));
/// assert_eq!(child.get_typed::<u32>(&ns, "shared").as_deref(), Some(&2));
/// assert_eq!(parent.get_typed::<u32>(&ns, "shared").as_deref(), Some(&1));
/// ```
pub struct Store {
    parent: Option<Arc<Store>>,
    entries: Mutex<HashMap<(Namespace, String), Entry>>,
    counter: AtomicU64,
}

impl Store {
    /// Creates a root store with no parent.
    pub fn root() -> Arc<Self> {
        Arc::new(Self {
            parent: None,
            entries: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(0),
        })
    }

    /// Creates a store delegating lookups to `parent`.
    pub fn child_of(parent: &Arc<Store>) -> Arc<Self> {
        Arc::new(Self {
            parent: Some(Arc::clone(parent)),
            entries: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(0),
        })
    }

    /// Looks up a value, delegating to the parent on a local miss.
    pub fn get(&self, namespace: &Namespace, key: &str) -> Option<StoredValue> {
        let local = {
            let entries = self.entries.lock().expect("store lock poisoned");
            entries
                .get(&(namespace.clone(), key.to_string()))
                .map(|e| Arc::clone(&e.value))
        };
        match local {
            Some(v) => Some(v),
            None => self
                .parent
                .as_ref()
                .and_then(|p| p.get(namespace, key)),
        }
    }

    /// Typed variant of [`get`](Self::get).
    pub fn get_typed<T: Any + Send + Sync>(
        &self,
        namespace: &Namespace,
        key: &str,
    ) -> Option<Arc<T>> {
        self.get(namespace, key)
            .and_then(|v| v.downcast::<T>().ok())
    }

    /// Writes a value into the local store, shadowing (not mutating) any
    /// ancestor entry under the same (namespace, key).
    pub fn put(&self, namespace: Namespace, key: impl Into<String>, value: StoredValue) {
        let mut entries = self.entries.lock().expect("store lock poisoned");
        let order = self.counter.fetch_add(1, AtomicOrdering::Relaxed);
        entries.insert(
            (namespace, key.into()),
            Entry {
                value,
                closer: None,
                order,
            },
        );
    }

    /// Writes a closeable resource into the local store. On
    /// [`close`](Self::close) the resource's close contract runs.
    pub fn put_resource<T>(&self, namespace: Namespace, key: impl Into<String>, value: Arc<T>)
    where
        T: CloseableResource + Any + Send + Sync,
    {
        let mut entries = self.entries.lock().expect("store lock poisoned");
        let order = self.counter.fetch_add(1, AtomicOrdering::Relaxed);
        entries.insert(
            (namespace, key.into()),
            Entry {
                value: value.clone() as StoredValue,
                closer: Some(value as Arc<dyn CloseableResource>),
                order,
            },
        );
    }

    /// Returns the value under (namespace, key), running `factory` to
    /// create it locally if neither this store nor an ancestor has one.
    ///
    /// The factory runs under the local lock, so it executes at most once
    /// per (namespace, key) pair for this store even with concurrent
    /// callers.
    pub fn get_or_compute<F>(&self, namespace: Namespace, key: impl Into<String>, factory: F) -> StoredValue
    where
        F: FnOnce() -> StoredValue,
    {
        let key = key.into();
        // Ancestor hit first: computing would shadow it.
        if let Some(parent) = &self.parent {
            if let Some(v) = parent.get(&namespace, &key) {
                return v;
            }
        }
        let mut entries = self.entries.lock().expect("store lock poisoned");
        if let Some(entry) = entries.get(&(namespace.clone(), key.clone())) {
            return Arc::clone(&entry.value);
        }
        let value = factory();
        let order = self.counter.fetch_add(1, AtomicOrdering::Relaxed);
        entries.insert(
            (namespace, key),
            Entry {
                value: Arc::clone(&value),
                closer: None,
                order,
            },
        );
        value
    }

    /// Closes owned closeable entries in reverse insertion order,
    /// aggregating individual close failures instead of stopping on the
    /// first.
    ///
    /// Entries are drained, so a second call is a no-op.
    pub fn close(&self) -> Result<(), TestFailure> {
        let mut closers: Vec<(u64, Arc<dyn CloseableResource>)> = {
            let mut entries = self.entries.lock().expect("store lock poisoned");
            entries
                .drain()
                .filter_map(|(_, entry)| {
                    let Entry { closer, order, .. } = entry;
                    closer.map(|c| (order, c))
                })
                .collect()
        };
        closers.sort_by(|a, b| b.0.cmp(&a.0));

        let mut collector = FailureCollector::new();
        for (_, closer) in closers {
            if let Err(failure) = closer.close() {
                collector.record(failure);
            }
        }
        collector.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn ns() -> Namespace {
        Namespace::global()
    }

    #[test]
    fn test_child_sees_parent_entries_unless_shadowed() {
        let parent = Store::root();
        parent.put(ns(), "a", Arc::new("parent".to_string()));
        let child = Store::child_of(&parent);

        assert_eq!(
            child.get_typed::<String>(&ns(), "a").as_deref(),
            Some(&"parent".to_string())
        );
        child.put(ns(), "a", Arc::new("child".to_string()));
        assert_eq!(
            child.get_typed::<String>(&ns(), "a").as_deref(),
            Some(&"child".to_string())
        );
        assert_eq!(
            parent.get_typed::<String>(&ns(), "a").as_deref(),
            Some(&"parent".to_string())
        );
    }

    #[test]
    fn test_namespaces_partition_the_key_space() {
        let store = Store::root();
        let mine = Namespace::create(["ext-a"]);
        let theirs = Namespace::create(["ext-b"]);
        store.put(mine.clone(), "k", Arc::new(1_u32));
        store.put(theirs.clone(), "k", Arc::new(2_u32));
        assert_eq!(store.get_typed::<u32>(&mine, "k").as_deref(), Some(&1));
        assert_eq!(store.get_typed::<u32>(&theirs, "k").as_deref(), Some(&2));
    }

    #[test]
    fn test_get_or_compute_runs_factory_once() {
        let store = Store::root();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            store.get_or_compute(ns(), "lazy", || {
                calls.fetch_add(1, AtomicOrdering::Relaxed);
                Arc::new(42_u32)
            });
        }
        assert_eq!(calls.load(AtomicOrdering::Relaxed), 1);
    }

    #[test]
    fn test_get_or_compute_prefers_ancestor_value() {
        let parent = Store::root();
        parent.put(ns(), "k", Arc::new(7_u32));
        let child = Store::child_of(&parent);
        let v = child.get_or_compute(ns(), "k", || Arc::new(99_u32));
        assert_eq!(*v.downcast::<u32>().unwrap(), 7);
    }

    struct Probe {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    impl CloseableResource for Probe {
        fn close(&self) -> Result<(), TestFailure> {
            self.log.lock().unwrap().push(self.label);
            if self.fail {
                Err(TestFailure::new(format!("close of {} failed", self.label)))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_close_runs_in_reverse_insertion_order() {
        let store = Store::root();
        let log = Arc::new(Mutex::new(Vec::new()));
        for label in ["first", "second", "third"] {
            store.put_resource(
                ns(),
                label,
                Arc::new(Probe {
                    label,
                    log: log.clone(),
                    fail: false,
                }),
            );
        }
        store.close().unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["third", "second", "first"]);
    }

    #[test]
    fn test_close_failure_does_not_stop_remaining_closers() {
        let store = Store::root();
        let log = Arc::new(Mutex::new(Vec::new()));
        store.put_resource(
            ns(),
            "keep",
            Arc::new(Probe {
                label: "keep",
                log: log.clone(),
                fail: false,
            }),
        );
        store.put_resource(
            ns(),
            "bad",
            Arc::new(Probe {
                label: "bad",
                log: log.clone(),
                fail: true,
            }),
        );

        let err = store.close().unwrap_err();
        assert_eq!(err.message, "close of bad failed");
        assert!(err.suppressed.is_empty());
        assert_eq!(*log.lock().unwrap(), vec!["bad", "keep"]);
        // Second close is a no-op.
        assert!(store.close().is_ok());
    }
}
