//! # Execution events emitted by the engine.
//!
//! The engine reports a fixed per-node event sequence to its listeners:
//! `DynamicallyRegistered` (dynamic children only), `Started`,
//! `Skipped(reason)`, `Finished(result)`, and `ReportingEntry` for
//! key/value payloads published mid-execution.
//!
//! Each event carries a globally unique, monotonically increasing
//! sequence number; use it to restore exact order when events are
//! recorded out of band.

mod event;
mod result;

pub use event::{EventKind, ExecutionEvent};
pub use result::ExecutionResult;
