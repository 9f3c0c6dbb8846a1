//! # LogListener — simple event printer
//!
//! A minimal listener that prints incoming events to stdout.
//! Use it for test or demo.
//!
//! ## Example output
//! ```text
//! [started] node=[engine:demo]/[test:one]
//! [finished] node=[engine:demo]/[test:one] result=ok
//! [skipped] node=[engine:demo]/[test:two] reason="disabled on CI"
//! [registered] node=[engine:demo]/[test:gen-3]
//! [report-entry] node=[engine:demo]/[test:one] entries=1
//! ```

use async_trait::async_trait;

use crate::events::{EventKind, ExecutionEvent, ExecutionResult};
use crate::listeners::TestListener;

/// Event printer listener.
#[derive(Default)]
pub struct LogListener;

impl LogListener {
    /// Construct a new [`LogListener`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TestListener for LogListener {
    async fn on_event(&self, e: &ExecutionEvent) {
        match e.kind {
            EventKind::Started => {
                println!("[started] node={}", e.node);
            }
            EventKind::Skipped => {
                println!(
                    "[skipped] node={} reason={:?}",
                    e.node,
                    e.reason.as_deref().unwrap_or("unknown")
                );
            }
            EventKind::DynamicallyRegistered => {
                println!("[registered] node={}", e.node);
            }
            EventKind::Finished => match &e.result {
                Some(ExecutionResult::Failed(failure)) => {
                    println!("[finished] node={} result=failed err={:?}", e.node, failure.message);
                }
                _ => {
                    println!("[finished] node={} result=ok", e.node);
                }
            },
            EventKind::ReportingEntry => {
                println!(
                    "[report-entry] node={} entries={}",
                    e.node,
                    e.entries.as_ref().map(Vec::len).unwrap_or(0)
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogListener"
    }
}
