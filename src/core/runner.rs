//! # Single-invocation runner.
//!
//! Executes one test body: acquires a worker permit, wires output
//! capture, runs the interceptor chain around the body, and applies the
//! timeout protocol.
//!
//! ## Timeout protocol
//! ```text
//! body ──────────────► finished in time ─► result as-is
//!   │
//!   └─ deadline hits ─► before_interrupt callbacks (best effort,
//!                       failures suppressed into the timeout failure)
//!                     ─► cancel the body's token
//!                     ─► wait up to Config::grace for cooperative unwind
//!                     ─► report the timeout failure
//! ```
//!
//! ## Rules
//! - Cancellation is cooperative: the body's token is a child of the
//!   branch token; the engine never kills the task, it cancels and
//!   waits.
//! - The worker permit is held for the duration of the body only;
//!   containers coordinate without a permit, so a nested tree cannot
//!   deadlock the pool.
//! - Captured output is republished as a `stdout`/`stderr` report entry
//!   whether the body passed, failed, or timed out.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::OwnedSemaphorePermit;
use tokio::{select, time};

use crate::core::lifecycle::ExecutionScope;
use crate::error::TestFailure;
use crate::extensions::{
    Extension, ExtensionContext, Invocation, InvocationKind, Registration, invoke_chain,
};
use crate::output::{StreamInterceptor, StreamTarget};
use crate::tree::{CaptureRoute, DynamicRegistrar, TestBody, TestContext, TestNode};

/// Runs one body through the interceptor chain with timeout and capture
/// handling. The returned failure (if any) is recorded into the node's
/// collector by the lifecycle.
pub(crate) async fn invoke_body(
    node: &Arc<TestNode>,
    body: TestBody,
    scope: &ExecutionScope,
    ctx: &Arc<ExtensionContext>,
    registrar: &DynamicRegistrar,
    registrations: &[Registration],
) -> Result<(), TestFailure> {
    let _permit = acquire_permit(scope).await?;

    let out = capture_route(
        scope.config.capture_stdout,
        StreamTarget::Stdout,
        scope.config.max_capture_bytes,
    );
    let err = capture_route(
        scope.config.capture_stderr,
        StreamTarget::Stderr,
        scope.config.max_capture_bytes,
    );

    let body_token = scope.token.child_token();
    let test_ctx = TestContext::new(body_token.clone(), Arc::clone(ctx), registrar.clone())
        .with_capture(out.clone(), err.clone());

    // The terminal callable: the body itself, with panics converted to
    // failures.
    let body_future = (body)(test_ctx);
    let terminal: BoxFuture<'static, Result<(), TestFailure>> = Box::pin(async move {
        match AssertUnwindSafe(body_future).catch_unwind().await {
            Ok(res) => res,
            Err(payload) => Err(TestFailure::from_panic(payload)),
        }
    });

    let interceptors: Vec<Arc<dyn Extension>> = registrations
        .iter()
        .map(|r| Arc::clone(r.extension()))
        .collect();
    let invocation = Invocation::new(node.id().clone(), InvocationKind::TestBody);
    let chain = invoke_chain(interceptors, invocation, Arc::clone(ctx), terminal);

    let timeout = node.timeout().or_else(|| scope.config.default_timeout());
    let result = match timeout {
        None => chain.await.map(|_| ()),
        Some(deadline) => {
            tokio::pin!(chain);
            let sleep = time::sleep(deadline);
            tokio::pin!(sleep);
            select! {
                res = &mut chain => res.map(|_| ()),
                _ = &mut sleep => {
                    let mut failure = TestFailure::timeout(deadline);
                    for reg in registrations {
                        let observer = reg.extension().before_interrupt(ctx);
                        match AssertUnwindSafe(observer).catch_unwind().await {
                            Ok(Ok(())) => {}
                            Ok(Err(f)) => failure.suppress(f),
                            Err(payload) => failure.suppress(TestFailure::from_panic(payload)),
                        }
                    }
                    body_token.cancel();
                    match time::timeout(scope.config.grace, &mut chain).await {
                        Ok(res) => {
                            if let Err(f) = res {
                                if !f.is_canceled() {
                                    failure.suppress(f);
                                }
                            }
                        }
                        Err(_) => failure.suppress(TestFailure::new(
                            "body did not unwind within the grace period",
                        )),
                    }
                    Err(failure)
                }
            }
        }
    };

    let mut entries = Vec::new();
    if let Some((interceptor, session)) = &out {
        let text = interceptor.consume(session);
        if !text.is_empty() {
            entries.push(("stdout".to_string(), text));
        }
    }
    if let Some((interceptor, session)) = &err {
        let text = interceptor.consume(session);
        if !text.is_empty() {
            entries.push(("stderr".to_string(), text));
        }
    }
    if !entries.is_empty() {
        ctx.publish_entries(entries).await;
    }

    result
}

/// Starts a capture on the (process-wide) interceptor for `target`,
/// installing it if this is the first use.
fn capture_route(enabled: bool, target: StreamTarget, max_bytes: usize) -> Option<CaptureRoute> {
    if !enabled {
        return None;
    }
    let interceptor = StreamInterceptor::install(target, max_bytes);
    let session = Arc::new(interceptor.capture());
    Some((interceptor, session))
}

/// Takes a slot in the bounded worker pool, waiting cancellably.
async fn acquire_permit(
    scope: &ExecutionScope,
) -> Result<Option<OwnedSemaphorePermit>, TestFailure> {
    let Some(semaphore) = &scope.semaphore else {
        return Ok(None);
    };
    let acquire = Arc::clone(semaphore).acquire_owned();
    tokio::pin!(acquire);
    select! {
        res = &mut acquire => match res {
            Ok(permit) => Ok(Some(permit)),
            Err(_closed) => Err(TestFailure::canceled()),
        },
        _ = scope.token.cancelled() => Err(TestFailure::canceled()),
    }
}
