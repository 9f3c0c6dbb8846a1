//! # The extension trait.
//!
//! One trait covers every lifecycle capability; each method has a
//! pass-through default, so an extension implements only what it needs.
//!
//! ## Hook scoping
//! - `before_all`/`after_all` run once, when the descriptor that
//!   *contributed* the extension executes (its registration origin).
//! - `before_each`/`after_each` run for every test-kind descendant the
//!   extension is visible to, origin included.
//!
//! ## Ordering
//! For a given node, "setup"-type capabilities (`evaluate_condition`,
//! `before_*`, outermost `intercept`) apply in registration order,
//! inherited registrations first; "teardown"-type capabilities
//! (`after_*`) apply in the exact reverse order. Resources acquired
//! later are released first.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TestFailure;
use crate::extensions::chain::{Invocation, InvocationHandle};
use crate::extensions::context::ExtensionContext;
use crate::tree::TestNode;

/// Outcome of a conditional-execution check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionResult {
    /// The node may execute.
    Enabled,
    /// The node must be skipped; Before/After never run.
    Disabled {
        /// Why, reported with the `Skipped` event.
        reason: String,
    },
}

impl ConditionResult {
    /// Shorthand for a disabling result.
    pub fn disabled(reason: impl Into<String>) -> Self {
        ConditionResult::Disabled {
            reason: reason.into(),
        }
    }

    /// True if the node must be skipped.
    pub fn is_disabled(&self) -> bool {
        matches!(self, ConditionResult::Disabled { .. })
    }
}

/// A pluggable lifecycle hook.
///
/// Implementations are `Send + Sync` because a single instance may apply
/// to concurrently executing subtrees.
#[async_trait]
pub trait Extension: Send + Sync + 'static {
    /// Human-readable name (for diagnostics and warnings).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Decides whether the node should execute at all. The first
    /// disabling extension wins; later ones are not consulted.
    fn evaluate_condition(&self, _ctx: &ExtensionContext) -> ConditionResult {
        ConditionResult::Enabled
    }

    /// Runs once, in the Before step of the descriptor that contributed
    /// this extension.
    async fn before_all(&self, _ctx: &ExtensionContext) -> Result<(), TestFailure> {
        Ok(())
    }

    /// Runs in the Before step of every test-kind node this extension is
    /// visible to. The first failing before hook stops the remaining
    /// ones; after hooks still run.
    async fn before_each(&self, _ctx: &ExtensionContext) -> Result<(), TestFailure> {
        Ok(())
    }

    /// Counterpart of [`before_each`](Self::before_each), in reverse
    /// registration order; always runs once Before started, even when
    /// earlier steps failed.
    async fn after_each(&self, _ctx: &ExtensionContext) -> Result<(), TestFailure> {
        Ok(())
    }

    /// Counterpart of [`before_all`](Self::before_all), in reverse
    /// registration order, on the contributing descriptor.
    async fn after_all(&self, _ctx: &ExtensionContext) -> Result<(), TestFailure> {
        Ok(())
    }

    /// Wraps one invocation (a lifecycle callback or the test body).
    /// Must call [`InvocationHandle::proceed`] exactly once — directly
    /// or by delegating — or [`InvocationHandle::skip`] to short-circuit
    /// without running the underlying callable. Anything else is a
    /// protocol violation reported as the node's result.
    async fn intercept(
        &self,
        mut invocation: InvocationHandle,
        _record: &Invocation,
        _ctx: &ExtensionContext,
    ) -> Result<(), TestFailure> {
        invocation.proceed().await
    }

    /// Reorders a container's children before execution.
    ///
    /// The engine never lets an ordering extension lose a test: children
    /// missing from the returned list are re-appended at the end in
    /// their original relative order, and entries the extension invented
    /// are dropped; both recoveries log a warning naming the extension.
    fn order_children(
        &self,
        _ctx: &ExtensionContext,
        children: Vec<Arc<TestNode>>,
    ) -> Vec<Arc<TestNode>> {
        children
    }

    /// Called best-effort after a timeout, before the executing body's
    /// token is cancelled, so diagnostics (thread dumps, state
    /// snapshots) can be captured. Failures are attached as suppressed
    /// to the timeout failure.
    async fn before_interrupt(&self, _ctx: &ExtensionContext) -> Result<(), TestFailure> {
        Ok(())
    }
}
