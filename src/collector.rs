//! # Failure collector for multi-step sequences.
//!
//! [`FailureCollector`] runs a sequence of fallible steps and accumulates
//! every failure instead of stopping at the first one. A before-hook
//! failure must not prevent after-hooks from running, but the reported
//! failure must still be singular and complete: [`into_result`] returns
//! the **first** collected failure with every later one attached to its
//! `suppressed` list, in order.
//!
//! Panics in a step are caught (`catch_unwind`, same isolation the
//! listener fan-out uses) and recorded as failures.
//!
//! [`into_result`]: FailureCollector::into_result

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use crate::error::TestFailure;

/// Accumulates failures from a sequence of fallible steps.
///
/// ## Rules
/// - [`execute`](Self::execute) never propagates; failures (and panics)
///   are appended.
/// - [`into_result`](Self::into_result) reports the first failure and
///   suppresses the rest into it, preserving order.
#[derive(Default)]
pub struct FailureCollector {
    failures: Vec<TestFailure>,
}

impl FailureCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one step, recording a failure or caught panic instead of
    /// propagating it.
    pub async fn execute<F>(&mut self, step: F)
    where
        F: Future<Output = Result<(), TestFailure>>,
    {
        match AssertUnwindSafe(step).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(failure)) => self.failures.push(failure),
            Err(payload) => self.failures.push(TestFailure::from_panic(payload)),
        }
    }

    /// Records an already-materialized failure.
    pub fn record(&mut self, failure: TestFailure) {
        self.failures.push(failure);
    }

    /// True if no step has failed so far.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Consumes the collector: `Ok(())` if nothing failed, otherwise the
    /// first failure with all later ones suppressed into it.
    pub fn into_result(self) -> Result<(), TestFailure> {
        let mut iter = self.failures.into_iter();
        match iter.next() {
            None => Ok(()),
            Some(mut first) => {
                for later in iter {
                    first.suppress(later);
                }
                Err(first)
            }
        }
    }
}
