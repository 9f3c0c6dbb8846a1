//! # Invocation interceptor chain.
//!
//! Every resolution point — a lifecycle callback, a constructor, the
//! test body — runs through a chain of interceptors built from the
//! node's extension registry, first-registered outermost.
//!
//! ## Single-invocation protocol
//! Each interceptor receives a single-use [`InvocationHandle`] and must
//! call [`proceed`](InvocationHandle::proceed) exactly once (directly or
//! by delegating to the next interceptor), or
//! [`skip`](InvocationHandle::skip) to short-circuit without running the
//! underlying callable. Violations are hard errors surfaced as the
//! node's result:
//! - zero calls → [`EngineError::ChainNeverInvoked`]
//! - more than one call → [`EngineError::ChainInvokedTwice`]
//!
//! `proceed` deliberately takes `&mut self` rather than `self`: a second
//! call must be representable so it can be *reported*, not just
//! prevented. The violation is recorded in shared chain state, so it
//! wins even if the offending interceptor swallows the error.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};

use futures::future::BoxFuture;

use crate::error::{EngineError, TestFailure};
use crate::extensions::{Extension, ExtensionContext};
use crate::ident::UniqueId;

/// Which resolution point an invocation wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationKind {
    /// A before/after lifecycle callback.
    LifecycleCallback,
    /// The test body itself.
    TestBody,
}

/// Immutable description of one invocation, passed through the chain
/// unchanged.
#[derive(Clone)]
pub struct Invocation {
    node: UniqueId,
    kind: InvocationKind,
    target: Option<Arc<dyn Any + Send + Sync>>,
    arguments: Vec<String>,
    target_type: Option<&'static str>,
}

impl Invocation {
    /// Creates a record for the given node and resolution point.
    pub fn new(node: UniqueId, kind: InvocationKind) -> Self {
        Self {
            node,
            kind,
            target: None,
            arguments: Vec::new(),
            target_type: None,
        }
    }

    /// Attaches the target instance the callable runs against.
    #[inline]
    pub fn with_target(mut self, target: Arc<dyn Any + Send + Sync>) -> Self {
        self.target = Some(target);
        self
    }

    /// Attaches the declared argument list (rendered).
    #[inline]
    pub fn with_arguments(mut self, arguments: Vec<String>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Attaches the target type name.
    #[inline]
    pub fn with_target_type(mut self, target_type: &'static str) -> Self {
        self.target_type = Some(target_type);
        self
    }

    /// Identifier of the node being invoked.
    pub fn node(&self) -> &UniqueId {
        &self.node
    }

    /// The resolution point.
    pub fn kind(&self) -> InvocationKind {
        self.kind
    }

    /// The target instance, if any.
    pub fn target(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.target.as_ref()
    }

    /// The declared argument list.
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// The target type name, if any.
    pub fn target_type(&self) -> Option<&'static str> {
        self.target_type
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("node", &self.node.to_string())
            .field("kind", &self.kind)
            .field("arguments", &self.arguments)
            .field("target_type", &self.target_type)
            .field("has_target", &self.target.is_some())
            .finish()
    }
}

/// How a completed chain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOutcome {
    /// The underlying callable ran.
    Invoked,
    /// An interceptor skipped the callable.
    Skipped,
}

type NextFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), TestFailure>> + Send>;

/// Shared per-chain bookkeeping the validation runs against.
#[derive(Default)]
struct ChainState {
    terminal_calls: AtomicUsize,
    skipped: AtomicBool,
    invoked_twice: AtomicBool,
}

/// Single-use handle an interceptor forwards through.
pub struct InvocationHandle {
    next: Option<NextFn>,
    state: Arc<ChainState>,
    node: UniqueId,
}

impl InvocationHandle {
    /// Invokes the rest of the chain (ending in the underlying
    /// callable). A second call on the same handle is a protocol
    /// violation: it returns an error *and* marks the chain invalid.
    pub async fn proceed(&mut self) -> Result<(), TestFailure> {
        match self.next.take() {
            Some(next) => next().await,
            None => {
                self.state
                    .invoked_twice
                    .store(true, AtomicOrdering::SeqCst);
                Err(TestFailure::protocol(EngineError::ChainInvokedTwice {
                    node: self.node.to_string(),
                }))
            }
        }
    }

    /// Short-circuits the chain without running the underlying callable.
    /// Calling it after `proceed` (or twice) is the same violation as a
    /// double `proceed`.
    pub fn skip(&mut self) {
        match self.next.take() {
            Some(_rest) => {
                self.state.skipped.store(true, AtomicOrdering::SeqCst);
            }
            None => {
                self.state
                    .invoked_twice
                    .store(true, AtomicOrdering::SeqCst);
            }
        }
    }
}

/// Runs `terminal` through `interceptors`, first-registered outermost,
/// enforcing the single-invocation protocol.
pub async fn invoke_chain(
    interceptors: Vec<Arc<dyn Extension>>,
    invocation: Invocation,
    ctx: Arc<ExtensionContext>,
    terminal: BoxFuture<'static, Result<(), TestFailure>>,
) -> Result<ChainOutcome, TestFailure> {
    let state = Arc::new(ChainState::default());
    let invocation = Arc::new(invocation);
    let node_id = invocation.node().clone();

    let terminal_state = Arc::clone(&state);
    let mut next: NextFn = Box::new(move || {
        terminal_state
            .terminal_calls
            .fetch_add(1, AtomicOrdering::SeqCst);
        terminal
    });

    // Wrap outside-in: iterating in reverse leaves the first-registered
    // interceptor outermost.
    for ext in interceptors.into_iter().rev() {
        let rest = next;
        let handle_state = Arc::clone(&state);
        let record = Arc::clone(&invocation);
        let context = Arc::clone(&ctx);
        let node = node_id.clone();
        next = Box::new(move || {
            Box::pin(async move {
                let handle = InvocationHandle {
                    next: Some(rest),
                    state: handle_state,
                    node,
                };
                ext.intercept(handle, &record, &context).await
            })
        });
    }

    let result = next().await;

    if state.invoked_twice.load(AtomicOrdering::SeqCst) {
        return Err(TestFailure::protocol(EngineError::ChainInvokedTwice {
            node: node_id.to_string(),
        }));
    }
    result?;
    if state.skipped.load(AtomicOrdering::SeqCst) {
        return Ok(ChainOutcome::Skipped);
    }
    if state.terminal_calls.load(AtomicOrdering::SeqCst) == 0 {
        return Err(TestFailure::protocol(EngineError::ChainNeverInvoked {
            node: node_id.to_string(),
        }));
    }
    Ok(ChainOutcome::Invoked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use crate::config::ConfigParameters;
    use crate::error::FailureKind;
    use crate::listeners::ListenerSet;
    use crate::store::Store;
    use crate::tree::TestNode;

    fn context() -> Arc<ExtensionContext> {
        let node = TestNode::container(UniqueId::root("engine", "demo").unwrap(), "demo").arc();
        Arc::new(ExtensionContext::new(
            node,
            Store::root(),
            Arc::new(ConfigParameters::new()),
            Arc::new(ListenerSet::new(Vec::new())),
            None,
        ))
    }

    fn invocation() -> Invocation {
        Invocation::new(UniqueId::root("engine", "demo").unwrap(), InvocationKind::TestBody)
    }

    struct Logging {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Extension for Logging {
        async fn intercept(
            &self,
            mut invocation: InvocationHandle,
            _record: &Invocation,
            _ctx: &ExtensionContext,
        ) -> Result<(), TestFailure> {
            self.log.lock().unwrap().push(format!("{}-in", self.label));
            let res = invocation.proceed().await;
            self.log.lock().unwrap().push(format!("{}-out", self.label));
            res
        }
    }

    struct NeverProceeds;

    #[async_trait]
    impl Extension for NeverProceeds {
        async fn intercept(
            &self,
            _invocation: InvocationHandle,
            _record: &Invocation,
            _ctx: &ExtensionContext,
        ) -> Result<(), TestFailure> {
            Ok(())
        }
    }

    struct ProceedsTwice;

    #[async_trait]
    impl Extension for ProceedsTwice {
        async fn intercept(
            &self,
            mut invocation: InvocationHandle,
            _record: &Invocation,
            _ctx: &ExtensionContext,
        ) -> Result<(), TestFailure> {
            invocation.proceed().await?;
            // Swallow the second call's error; the chain must still
            // report the violation.
            let _ = invocation.proceed().await;
            Ok(())
        }
    }

    struct Skips;

    #[async_trait]
    impl Extension for Skips {
        async fn intercept(
            &self,
            mut invocation: InvocationHandle,
            _record: &Invocation,
            _ctx: &ExtensionContext,
        ) -> Result<(), TestFailure> {
            invocation.skip();
            Ok(())
        }
    }

    fn terminal(counter: &Arc<AtomicUsize>) -> BoxFuture<'static, Result<(), TestFailure>> {
        let counter = Arc::clone(counter);
        Box::pin(async move {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_first_registered_interceptor_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let interceptors: Vec<Arc<dyn Extension>> = vec![
            Arc::new(Logging {
                label: "outer",
                log: log.clone(),
            }),
            Arc::new(Logging {
                label: "inner",
                log: log.clone(),
            }),
        ];

        let outcome = invoke_chain(interceptors, invocation(), context(), terminal(&calls))
            .await
            .unwrap();

        assert_eq!(outcome, ChainOutcome::Invoked);
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["outer-in", "inner-in", "inner-out", "outer-out"]
        );
    }

    #[tokio::test]
    async fn test_chain_never_invoked_is_a_protocol_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let interceptors: Vec<Arc<dyn Extension>> = vec![Arc::new(NeverProceeds)];

        let err = invoke_chain(interceptors, invocation(), context(), terminal(&calls))
            .await
            .unwrap_err();

        assert_eq!(err.kind, FailureKind::Protocol);
        assert!(err.message.contains("never invoked"));
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_chain_invoked_twice_is_reported_even_if_swallowed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let interceptors: Vec<Arc<dyn Extension>> = vec![Arc::new(ProceedsTwice)];

        let err = invoke_chain(interceptors, invocation(), context(), terminal(&calls))
            .await
            .unwrap_err();

        assert_eq!(err.kind, FailureKind::Protocol);
        assert!(err.message.contains("multiple times"));
        // The callable itself still ran exactly once.
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_skip_short_circuits_the_callable() {
        let calls = Arc::new(AtomicUsize::new(0));
        let interceptors: Vec<Arc<dyn Extension>> = vec![Arc::new(Skips)];

        let outcome = invoke_chain(interceptors, invocation(), context(), terminal(&calls))
            .await
            .unwrap();

        assert_eq!(outcome, ChainOutcome::Skipped);
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_chain_just_runs_the_callable() {
        let calls = Arc::new(AtomicUsize::new(0));
        let outcome = invoke_chain(Vec::new(), invocation(), context(), terminal(&calls))
            .await
            .unwrap();
        assert_eq!(outcome, ChainOutcome::Invoked);
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_terminal_failure_propagates_as_user_failure() {
        let interceptors: Vec<Arc<dyn Extension>> = Vec::new();
        let failing: BoxFuture<'static, Result<(), TestFailure>> =
            Box::pin(async { Err(TestFailure::new("body failed")) });

        let err = invoke_chain(interceptors, invocation(), context(), failing)
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::UserCode);
        assert_eq!(err.message, "body failed");
    }
}
