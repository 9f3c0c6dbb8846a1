//! # The execution event type.
//!
//! [`ExecutionEvent`] is a flat struct: an [`EventKind`] plus optional
//! fields set depending on the kind, built with `with_*` methods.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that
//! increases monotonically across the whole process, so merged streams
//! from concurrent branches can be re-ordered deterministically.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::events::ExecutionResult;
use crate::ident::UniqueId;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of execution events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A child was registered during execution (dynamic registration).
    ///
    /// Sets:
    /// - `reason`: none
    /// - `at`, `seq`
    DynamicallyRegistered,

    /// The node's lifecycle entered its Before step.
    ///
    /// Sets:
    /// - `at`, `seq`
    Started,

    /// A conditional-execution extension disabled the node; Before and
    /// After never ran.
    ///
    /// Sets:
    /// - `reason`: the condition's explanation
    /// - `at`, `seq`
    Skipped,

    /// The node's lifecycle completed.
    ///
    /// Sets:
    /// - `result`: aggregated outcome
    /// - `at`, `seq`
    Finished,

    /// A key/value report entry was published mid-execution (by an
    /// extension or by output capture).
    ///
    /// Sets:
    /// - `entries`: the published pairs
    /// - `at`, `seq`
    ReportingEntry,
}

impl EventKind {
    /// True for events dispatched to listeners in reverse list order
    /// (mirroring the before/after nesting rule).
    pub fn is_finish_type(&self) -> bool {
        matches!(self, EventKind::Finished | EventKind::Skipped)
    }
}

/// One execution event with optional metadata.
///
/// # Example
/// ```
/// use testvisor::{EventKind, ExecutionEvent, UniqueId};
///
/// let id = UniqueId::root("engine", "demo").unwrap();
/// let ev = ExecutionEvent::new(EventKind::Skipped, id.clone())
///     .with_reason("disabled on this platform");
///
/// assert_eq!(ev.kind, EventKind::Skipped);
/// assert_eq!(ev.node, id);
/// assert_eq!(ev.reason.as_deref(), Some("disabled on this platform"));
/// ```
#[derive(Debug, Clone)]
pub struct ExecutionEvent {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Identifier of the node the event concerns.
    pub node: UniqueId,
    /// Display name of the node.
    pub display_name: Arc<str>,
    /// Skip reason (`Skipped` only).
    pub reason: Option<Arc<str>>,
    /// Aggregated outcome (`Finished` only).
    pub result: Option<ExecutionResult>,
    /// Published pairs (`ReportingEntry` only).
    pub entries: Option<Vec<(String, String)>>,
}

impl ExecutionEvent {
    /// Creates an event of the given kind with the current timestamp and
    /// next sequence number.
    pub fn new(kind: EventKind, node: UniqueId) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            node,
            display_name: Arc::from(""),
            reason: None,
            result: None,
            entries: None,
        }
    }

    /// Attaches the node's display name.
    #[inline]
    pub fn with_display_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Attaches a skip reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches the aggregated outcome.
    #[inline]
    pub fn with_result(mut self, result: ExecutionResult) -> Self {
        self.result = Some(result);
        self
    }

    /// Attaches published report entries.
    #[inline]
    pub fn with_entries(mut self, entries: Vec<(String, String)>) -> Self {
        self.entries = Some(entries);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_numbers_increase() {
        let id = UniqueId::root("engine", "demo").unwrap();
        let a = ExecutionEvent::new(EventKind::Started, id.clone());
        let b = ExecutionEvent::new(EventKind::Finished, id);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_finish_type_classification() {
        assert!(EventKind::Finished.is_finish_type());
        assert!(EventKind::Skipped.is_finish_type());
        assert!(!EventKind::Started.is_finish_type());
        assert!(!EventKind::DynamicallyRegistered.is_finish_type());
        assert!(!EventKind::ReportingEntry.is_finish_type());
    }
}
