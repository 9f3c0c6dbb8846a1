//! # Node lifecycle state machine.
//!
//! Drives one descriptor through its strictly ordered states:
//!
//! ```text
//! Prepare ─► ShouldSkip ─┬─► Skipped (terminal, store still closed)
//!                        │
//!                        └─► Before ─► Execute-or-Descend ─► After ─► Cleanup
//! ```
//!
//! ## Rules
//! - **Prepare** builds the child extension registry, child store scope,
//!   and extension context; the effective lock set is the parent's plus
//!   the node's own.
//! - **ShouldSkip** evaluates conditional extensions forward; the first
//!   disabling one wins and Before/After never run.
//! - **Before** runs `before_all` hooks (registration origin only) then
//!   `before_each` hooks (test-kind nodes), forward; the first failure
//!   stops remaining before hooks but never the after hooks.
//! - **Execute-or-Descend**: test-kind nodes invoke the interceptor
//!   chain around the body; container-kind nodes descend into children
//!   via the scheduler. Children registered dynamically during the body
//!   run before the node's own After step, each isolated in its own
//!   failure collector.
//! - **After** mirrors Before in reverse and always runs once Before
//!   started. **Cleanup** closes the store unconditionally.
//! - Every step funnels through one [`FailureCollector`]; the aggregate
//!   is asserted once and reported as the node's result.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::collector::FailureCollector;
use crate::config::{Config, ConfigParameters, OrderingStrategy};
use crate::core::{runner, scheduler};
use crate::error::TestFailure;
use crate::events::{EventKind, ExecutionEvent, ExecutionResult};
use crate::extensions::{
    ConditionResult, Extension, ExtensionContext, ExtensionRegistry, Invocation, InvocationKind,
    Order, Registration, invoke_chain,
};
use crate::ident::UniqueId;
use crate::listeners::ListenerSet;
use crate::locks::ResourceLock;
use crate::store::Store;
use crate::tree::{DynamicRegistrar, TestNode};

/// Per-branch execution state, cloned (cheaply, all `Arc`s) for every
/// dispatched subtree so concurrently running siblings never share a
/// context.
#[derive(Clone)]
pub(crate) struct ExecutionScope {
    pub registry: Arc<ExtensionRegistry>,
    pub store: Arc<Store>,
    pub config: Arc<Config>,
    pub parameters: Arc<ConfigParameters>,
    pub listeners: Arc<ListenerSet>,
    /// Effective lock set: the owning node's locks plus all ancestors'.
    pub locks: Vec<ResourceLock>,
    pub semaphore: Option<Arc<Semaphore>>,
    pub token: CancellationToken,
}

/// Executes one node (and its subtree) within `parent`'s scope.
///
/// Boxed because containers recurse through the scheduler.
pub(crate) fn execute_node(node: Arc<TestNode>, parent: ExecutionScope) -> BoxFuture<'static, ()> {
    Box::pin(run_node(node, parent))
}

async fn run_node(node: Arc<TestNode>, parent: ExecutionScope) {
    // Prepare.
    let own: Vec<Registration> = node
        .extensions()
        .iter()
        .map(|ext| Registration::new(Arc::clone(ext), node.id().clone()))
        .collect();
    let registry = ExtensionRegistry::child_of(&parent.registry, own);
    let store = Store::child_of(&parent.store);
    let mut locks = parent.locks.clone();
    locks.extend(node.locks().iter().cloned());
    let scope = ExecutionScope {
        registry,
        store: Arc::clone(&store),
        config: Arc::clone(&parent.config),
        parameters: Arc::clone(&parent.parameters),
        listeners: Arc::clone(&parent.listeners),
        locks,
        semaphore: parent.semaphore.clone(),
        token: parent.token.child_token(),
    };
    let ctx = Arc::new(ExtensionContext::new(
        Arc::clone(&node),
        Arc::clone(&store),
        Arc::clone(&scope.parameters),
        Arc::clone(&scope.listeners),
        scope.config.output_dir.clone(),
    ));
    let registrations = scope.registry.stream(Order::Forward);

    // ShouldSkip.
    let skip_reason = if scope.token.is_cancelled() {
        Some("run cancelled".to_string())
    } else {
        registrations
            .iter()
            .find_map(|reg| match reg.extension().evaluate_condition(&ctx) {
                ConditionResult::Enabled => None,
                ConditionResult::Disabled { reason } => Some(reason),
            })
    };
    if let Some(reason) = skip_reason {
        scope
            .listeners
            .dispatch(
                &ExecutionEvent::new(EventKind::Skipped, node.id().clone())
                    .with_display_name(node.display_name())
                    .with_reason(reason),
            )
            .await;
        if let Err(failure) = store.close() {
            warn!(node = %node.id(), error = %failure, "store teardown failed for skipped node");
        }
        return;
    }

    scope
        .listeners
        .dispatch(
            &ExecutionEvent::new(EventKind::Started, node.id().clone())
                .with_display_name(node.display_name()),
        )
        .await;

    let mut collector = FailureCollector::new();

    // Before: before_all on the contributing node, then before_each for
    // test-kind nodes. First failure stops the remaining before hooks.
    'before: {
        for reg in &registrations {
            if reg.origin() == node.id() {
                collector
                    .execute(run_hook(reg, &registrations, &ctx, node.id(), Hook::BeforeAll))
                    .await;
                if !collector.is_empty() {
                    break 'before;
                }
            }
        }
        if node.kind().is_test() {
            for reg in &registrations {
                collector
                    .execute(run_hook(reg, &registrations, &ctx, node.id(), Hook::BeforeEach))
                    .await;
                if !collector.is_empty() {
                    break 'before;
                }
            }
        }
    }
    let before_ok = collector.is_empty();

    // Execute-or-Descend. Static children are snapshotted before the
    // body runs so dynamically registered ones are not executed twice.
    if before_ok {
        let static_children = node.children();
        let registrar = DynamicRegistrar::new();

        if node.kind().is_test() {
            if let Some(body) = node.body() {
                if let Err(failure) = runner::invoke_body(
                    &node,
                    Arc::clone(body),
                    &scope,
                    &ctx,
                    &registrar,
                    &registrations,
                )
                .await
                {
                    collector.record(failure);
                }
            }
        }

        if node.kind().is_container() {
            let ordered = ordered_children(static_children, &ctx, &scope, &registrations);
            scheduler::execute_children(ordered, &scope).await;
        }

        // Dynamic children observe the same before-state and run before
        // this node's After step, each with its own collector.
        for child in registrar.drain() {
            if !node.id().is_ancestor_of(child.id()) {
                warn!(
                    parent = %node.id(),
                    child = %child.id(),
                    "dynamically registered child id does not extend its parent's"
                );
            }
            node.add_child(Arc::clone(&child));
            scope
                .listeners
                .dispatch(
                    &ExecutionEvent::new(EventKind::DynamicallyRegistered, child.id().clone())
                        .with_display_name(child.display_name()),
                )
                .await;
            execute_node(child, scope.clone()).await;
        }
    }

    // After: the exact reverse of Before, and it always runs once
    // Before started.
    if node.kind().is_test() {
        for reg in scope.registry.stream(Order::Backward) {
            collector
                .execute(run_hook(&reg, &registrations, &ctx, node.id(), Hook::AfterEach))
                .await;
        }
    }
    for reg in scope.registry.stream(Order::Backward) {
        if reg.origin() == node.id() {
            collector
                .execute(run_hook(&reg, &registrations, &ctx, node.id(), Hook::AfterAll))
                .await;
        }
    }

    // Cleanup.
    if let Err(failure) = store.close() {
        collector.record(failure);
    }

    let result = ExecutionResult::from_outcome(collector.into_result());
    scope
        .listeners
        .dispatch(
            &ExecutionEvent::new(EventKind::Finished, node.id().clone())
                .with_display_name(node.display_name())
                .with_result(result),
        )
        .await;
}

#[derive(Clone, Copy)]
enum Hook {
    BeforeAll,
    BeforeEach,
    AfterEach,
    AfterAll,
}

impl Hook {
    fn label(self) -> &'static str {
        match self {
            Hook::BeforeAll => "before_all",
            Hook::BeforeEach => "before_each",
            Hook::AfterEach => "after_each",
            Hook::AfterAll => "after_all",
        }
    }
}

/// Runs one lifecycle hook through the interceptor chain, so extensions
/// wrap lifecycle callbacks exactly like test bodies.
async fn run_hook(
    reg: &Registration,
    registrations: &[Registration],
    ctx: &Arc<ExtensionContext>,
    node_id: &UniqueId,
    hook: Hook,
) -> Result<(), TestFailure> {
    let ext = Arc::clone(reg.extension());
    let hook_ctx = Arc::clone(ctx);
    let terminal: BoxFuture<'static, Result<(), TestFailure>> = match hook {
        Hook::BeforeAll => Box::pin(async move { ext.before_all(&hook_ctx).await }),
        Hook::BeforeEach => Box::pin(async move { ext.before_each(&hook_ctx).await }),
        Hook::AfterEach => Box::pin(async move { ext.after_each(&hook_ctx).await }),
        Hook::AfterAll => Box::pin(async move { ext.after_all(&hook_ctx).await }),
    };
    let interceptors: Vec<Arc<dyn Extension>> = registrations
        .iter()
        .map(|r| Arc::clone(r.extension()))
        .collect();
    let invocation = Invocation::new(node_id.clone(), InvocationKind::LifecycleCallback)
        .with_target_type(hook.label());
    invoke_chain(interceptors, invocation, Arc::clone(ctx), terminal)
        .await
        .map(|_| ())
}

/// Applies the configured ordering strategy, then each ordering
/// extension, recovering from misbehaving ones.
fn ordered_children(
    mut children: Vec<Arc<TestNode>>,
    ctx: &Arc<ExtensionContext>,
    scope: &ExecutionScope,
    registrations: &[Registration],
) -> Vec<Arc<TestNode>> {
    match scope.config.ordering {
        OrderingStrategy::Declaration => {}
        OrderingStrategy::Alphanumeric => {
            children.sort_by(|a, b| a.display_name().cmp(b.display_name()));
        }
        OrderingStrategy::Random => {
            use rand::seq::SliceRandom;
            children.shuffle(&mut rand::rng());
        }
    }
    for reg in registrations {
        let proposed = reg.extension().order_children(ctx, children.clone());
        children = reconcile_ordering(reg, children, proposed);
    }
    children
}

/// Never lose a real test: entries the extension removed are re-added at
/// the end in their original relative order; entries it invented are
/// dropped.
fn reconcile_ordering(
    reg: &Registration,
    original: Vec<Arc<TestNode>>,
    proposed: Vec<Arc<TestNode>>,
) -> Vec<Arc<TestNode>> {
    let by_id: HashMap<UniqueId, Arc<TestNode>> = original
        .iter()
        .map(|c| (c.id().clone(), Arc::clone(c)))
        .collect();
    let mut result = Vec::with_capacity(original.len());
    let mut seen: HashSet<UniqueId> = HashSet::new();
    for child in proposed {
        match by_id.get(child.id()) {
            Some(known) => {
                if seen.insert(child.id().clone()) {
                    result.push(Arc::clone(known));
                } else {
                    warn!(
                        extension = reg.extension().name(),
                        child = %child.id(),
                        "ordering extension returned a duplicate entry; ignoring"
                    );
                }
            }
            None => {
                warn!(
                    extension = reg.extension().name(),
                    child = %child.id(),
                    "ordering extension added an unknown descriptor; ignoring"
                );
            }
        }
    }
    for child in original {
        if !seen.contains(child.id()) {
            warn!(
                extension = reg.extension().name(),
                child = %child.id(),
                "ordering extension removed a descriptor; re-adding at the end"
            );
            result.push(child);
        }
    }
    result
}
