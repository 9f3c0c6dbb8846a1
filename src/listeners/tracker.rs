//! # Stateful listener that tallies a run.
//!
//! [`RunTracker`] listens to the merged event stream and keeps per-root
//! totals: how many nodes started, succeeded, failed, were skipped or
//! dynamically registered, plus every failure with its identifier. The
//! orchestrator resets it before each root and snapshots it afterwards
//! to build the run report.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::TestFailure;
use crate::events::{EventKind, ExecutionEvent, ExecutionResult};
use crate::ident::UniqueId;
use crate::listeners::TestListener;

/// Aggregated tallies for one root.
#[derive(Debug, Clone, Default)]
pub struct RunTotals {
    /// Nodes whose lifecycle entered Before.
    pub started: u64,
    /// Nodes that finished successfully.
    pub succeeded: u64,
    /// Nodes that finished with a failure.
    pub failed: u64,
    /// Nodes disabled by a conditional extension.
    pub skipped: u64,
    /// Children registered during execution.
    pub dynamically_registered: u64,
    /// Every failure, with the failing node's identifier, in finish
    /// order.
    pub failures: Vec<(UniqueId, TestFailure)>,
}

/// Tracks totals for the root currently executing.
///
/// Thread-safe and cloneable; clones share the same state.
#[derive(Clone, Default)]
pub struct RunTracker {
    inner: Arc<Mutex<RunTotals>>,
}

impl RunTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the tallies; called by the orchestrator between roots.
    pub fn reset(&self) {
        *self.inner.lock().expect("tracker lock poisoned") = RunTotals::default();
    }

    /// Returns a copy of the current tallies.
    pub fn snapshot(&self) -> RunTotals {
        self.inner.lock().expect("tracker lock poisoned").clone()
    }
}

#[async_trait]
impl TestListener for RunTracker {
    async fn on_event(&self, event: &ExecutionEvent) {
        let mut totals = self.inner.lock().expect("tracker lock poisoned");
        match event.kind {
            EventKind::Started => totals.started += 1,
            EventKind::Skipped => totals.skipped += 1,
            EventKind::DynamicallyRegistered => totals.dynamically_registered += 1,
            EventKind::Finished => match &event.result {
                Some(ExecutionResult::Failed(failure)) => {
                    totals.failed += 1;
                    totals.failures.push((event.node.clone(), failure.clone()));
                }
                _ => totals.succeeded += 1,
            },
            EventKind::ReportingEntry => {}
        }
    }

    fn name(&self) -> &'static str {
        "RunTracker"
    }
}
