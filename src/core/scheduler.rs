//! # Lock-aware sibling scheduler.
//!
//! Partitions a container's ordered children into an independent set,
//! dispatched concurrently on a [`JoinSet`], and a serial remainder run
//! in order afterwards. Partitioning is greedy over the ordered list: a
//! child joins the concurrent set only if parallel execution is enabled,
//! its effective mode is `Concurrent`, it holds no global lock, and its
//! effective lock set conflicts with nobody already accepted.
//!
//! A node's effective lock set is the union of its own declared locks
//! and all of its ancestors' (carried down in the scope). Dispatch never
//! pairs conflicting nodes, so lock mutual exclusion holds by
//! construction and user code needs no extra runtime locking.
//!
//! Parallelism is recursive, not flat: every dispatched child partitions
//! its own children again with the same rule. The bounded worker pool is
//! enforced at body granularity (see the runner), so deep trees cannot
//! deadlock the pool.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::core::lifecycle::{ExecutionScope, execute_node};
use crate::locks::{ExecutionMode, ResourceLock, lock_sets_conflict};
use crate::tree::TestNode;

/// Executes `children` (already ordered) under `scope`, respecting
/// declared resource conflicts.
pub(crate) async fn execute_children(children: Vec<Arc<TestNode>>, scope: &ExecutionScope) {
    let mut concurrent: Vec<(Arc<TestNode>, Vec<ResourceLock>)> = Vec::new();
    let mut serial: Vec<Arc<TestNode>> = Vec::new();

    for child in children {
        let mode = child.mode().unwrap_or(scope.config.default_mode);
        let mut locks = scope.locks.clone();
        locks.extend(child.locks().iter().cloned());

        let independent = scope.config.parallel
            && mode == ExecutionMode::Concurrent
            && !locks.iter().any(ResourceLock::is_global)
            && concurrent
                .iter()
                .all(|(_, held)| !lock_sets_conflict(&locks, held));

        if independent {
            concurrent.push((child, locks));
        } else {
            serial.push(child);
        }
    }

    let mut set = JoinSet::new();
    for (child, _locks) in concurrent {
        set.spawn(execute_node(child, scope.clone()));
    }
    while set.join_next().await.is_some() {}

    for child in serial {
        execute_node(child, scope.clone()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Barrier;
    use tokio_util::sync::CancellationToken;

    use crate::config::Config;
    use crate::config::ConfigParameters;
    use crate::error::TestFailure;
    use crate::extensions::{Extension, ExtensionContext, ExtensionRegistry};
    use crate::ident::UniqueId;
    use crate::listeners::ListenerSet;
    use crate::store::Store;

    fn parallel_scope(workers: usize) -> ExecutionScope {
        let mut config = Config::default();
        config.parallel = true;
        config.max_workers = workers;
        config.default_mode = ExecutionMode::Concurrent;
        ExecutionScope {
            registry: ExtensionRegistry::root(Vec::new()),
            store: Store::root(),
            config: Arc::new(config),
            parameters: Arc::new(ConfigParameters::new()),
            listeners: Arc::new(ListenerSet::new(Vec::new())),
            locks: Vec::new(),
            semaphore: None,
            token: CancellationToken::new(),
        }
    }

    fn id(text: &str) -> UniqueId {
        UniqueId::parse(text).unwrap()
    }

    /// Tracks how many bodies run at once and the highest watermark.
    #[derive(Default)]
    struct Overlap {
        current: AtomicUsize,
        max: AtomicUsize,
    }

    impl Overlap {
        fn enter(&self) {
            let now = self.current.fetch_add(1, AtomicOrdering::SeqCst) + 1;
            self.max.fetch_max(now, AtomicOrdering::SeqCst);
        }

        fn exit(&self) {
            self.current.fetch_sub(1, AtomicOrdering::SeqCst);
        }
    }

    fn overlapping_test(
        id_text: &str,
        overlap: &Arc<Overlap>,
        lock: Option<ResourceLock>,
    ) -> Arc<TestNode> {
        let overlap = Arc::clone(overlap);
        let mut node = TestNode::test(id(id_text), id_text, move |_ctx| {
            let overlap = Arc::clone(&overlap);
            async move {
                overlap.enter();
                tokio::time::sleep(Duration::from_millis(50)).await;
                overlap.exit();
                Ok(())
            }
        });
        if let Some(lock) = lock {
            node = node.with_lock(lock);
        }
        node.arc()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_disjoint_lock_siblings_may_overlap() {
        // Both bodies block on one barrier: the test only completes if
        // the scheduler really ran them concurrently.
        let barrier = Arc::new(Barrier::new(2));
        let make = |id_text: &str, key: &str| {
            let barrier = Arc::clone(&barrier);
            TestNode::test(id(id_text), id_text, move |_ctx| {
                let barrier = Arc::clone(&barrier);
                async move {
                    barrier.wait().await;
                    Ok(())
                }
            })
            .with_lock(ResourceLock::read_write(key))
            .arc()
        };
        let children = vec![make("[test:a]", "res-a"), make("[test:b]", "res-b")];

        tokio::time::timeout(
            Duration::from_secs(5),
            execute_children(children, &parallel_scope(4)),
        )
        .await
        .expect("disjoint-lock siblings deadlocked instead of overlapping");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_exclusive_lock_never_overlaps() {
        let overlap = Arc::new(Overlap::default());
        let children = vec![
            overlapping_test("[test:a]", &overlap, Some(ResourceLock::read_write("R"))),
            overlapping_test("[test:b]", &overlap, Some(ResourceLock::read_write("R"))),
            overlapping_test("[test:c]", &overlap, Some(ResourceLock::read_write("R"))),
        ];

        execute_children(children, &parallel_scope(4)).await;

        assert_eq!(overlap.max.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shared_read_locks_may_overlap() {
        let barrier = Arc::new(Barrier::new(2));
        let make = |id_text: &str| {
            let barrier = Arc::clone(&barrier);
            TestNode::test(id(id_text), id_text, move |_ctx| {
                let barrier = Arc::clone(&barrier);
                async move {
                    barrier.wait().await;
                    Ok(())
                }
            })
            .with_lock(ResourceLock::read("R"))
            .arc()
        };
        let children = vec![make("[test:a]"), make("[test:b]")];

        tokio::time::timeout(
            Duration::from_secs(5),
            execute_children(children, &parallel_scope(4)),
        )
        .await
        .expect("read-lock siblings should run concurrently");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_global_lock_serializes() {
        let overlap = Arc::new(Overlap::default());
        let children = vec![
            overlapping_test("[test:a]", &overlap, Some(ResourceLock::global())),
            overlapping_test("[test:b]", &overlap, None),
        ];

        execute_children(children, &parallel_scope(4)).await;

        assert_eq!(overlap.max.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_serial_mode_respected_even_with_parallel_enabled() {
        let overlap = Arc::new(Overlap::default());
        let make = |id_text: &str| {
            let overlap = Arc::clone(&overlap);
            TestNode::test(id(id_text), id_text, move |_ctx| {
                let overlap = Arc::clone(&overlap);
                async move {
                    overlap.enter();
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    overlap.exit();
                    Ok(())
                }
            })
            .with_mode(ExecutionMode::Serial)
            .arc()
        };
        let children = vec![make("[test:a]"), make("[test:b]")];

        execute_children(children, &parallel_scope(4)).await;

        assert_eq!(overlap.max.load(AtomicOrdering::SeqCst), 1);
    }

    /// Before-all / after-all pair recording into a shared log.
    struct SuiteHooks {
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Extension for SuiteHooks {
        async fn before_all(&self, _ctx: &ExtensionContext) -> Result<(), TestFailure> {
            self.log.lock().unwrap().push("before-all".to_string());
            Ok(())
        }

        async fn after_all(&self, _ctx: &ExtensionContext) -> Result<(), TestFailure> {
            self.log.lock().unwrap().push("after-all".to_string());
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_locked_class_with_four_workers_keeps_hook_ordering() {
        // root → classA{before-all, after-all, lock "R"} → {test1, test2}
        // with 4 workers: exactly one before-all, both tests in any
        // relative order, one after-all, properly bracketed.
        let log = Arc::new(Mutex::new(Vec::new()));
        let class = TestNode::container(id("[engine:demo]/[class:a]"), "classA")
            .with_lock(ResourceLock::read_write("R"))
            .with_extension(Arc::new(SuiteHooks { log: log.clone() }))
            .arc();
        for test_name in ["test1", "test2"] {
            let log = log.clone();
            let name = test_name.to_string();
            class.add_child(
                TestNode::test(
                    id(&format!("[engine:demo]/[class:a]/[test:{test_name}]")),
                    test_name,
                    move |_ctx| {
                        let log = log.clone();
                        let name = name.clone();
                        async move {
                            log.lock().unwrap().push(name);
                            Ok(())
                        }
                    },
                )
                .arc(),
            );
        }
        let root = TestNode::container(id("[engine:demo]"), "demo").arc();
        root.add_child(class);

        let mut scope = parallel_scope(4);
        scope.semaphore = Some(Arc::new(tokio::sync::Semaphore::new(4)));
        execute_node(root, scope).await;

        let recorded = log.lock().unwrap().clone();
        assert_eq!(recorded.len(), 4, "unexpected log: {recorded:?}");
        assert_eq!(recorded.first().map(String::as_str), Some("before-all"));
        assert_eq!(recorded.last().map(String::as_str), Some("after-all"));
        assert!(recorded[1..3].contains(&"test1".to_string()));
        assert!(recorded[1..3].contains(&"test2".to_string()));
    }
}
