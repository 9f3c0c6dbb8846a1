//! Error types used by the testvisor engine and by test code.
//!
//! This module defines the two halves of the failure taxonomy:
//!
//! - [`EngineError`] — protocol violations raised by the engine itself
//!   (malformed identifiers, duplicate descriptors, interceptor misuse,
//!   aborted discovery).
//! - [`TestFailure`] — failures raised by user code (hooks, test bodies)
//!   or derived from timeouts and cancellation, with a `suppressed` list
//!   so that no failure in a sequence of steps is ever discarded.
//!
//! [`EngineError`] provides `as_label` for logging/metrics. Protocol
//! violations are always fatal to the affected node and are surfaced as
//! that node's result via [`TestFailure::protocol`].

use thiserror::Error;

use crate::discovery::Severity;

/// # Errors produced by the engine itself.
///
/// These represent misuse of the engine's protocols rather than failures
/// of the code under test. They are always fatal to the affected node or
/// root.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// An identifier string could not be parsed, or a segment contained a
    /// reserved character.
    #[error("malformed unique id {text:?}: {reason}")]
    MalformedId {
        /// The offending input text (or segment part).
        text: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The same identifier is reachable via two different paths from the
    /// root.
    #[error("duplicate unique id {id}: first at {first}, again at {second}")]
    DuplicateId {
        /// The duplicated identifier, rendered.
        id: String,
        /// Display-name path of the first occurrence.
        first: String,
        /// Display-name path of the second occurrence.
        second: String,
    },

    /// A descriptor is its own ancestor.
    #[error("descriptor cycle detected: {path}")]
    CycleDetected {
        /// Display-name path tracing the cycle.
        path: String,
    },

    /// An interceptor chain completed without any interceptor calling
    /// `proceed()` or `skip()`.
    #[error("invocation chain for {node} was never invoked")]
    ChainNeverInvoked {
        /// Rendered identifier of the affected node.
        node: String,
    },

    /// An interceptor called `proceed()`/`skip()` more than once on the
    /// same handle.
    #[error("invocation chain for {node} was invoked multiple times")]
    ChainInvokedTwice {
        /// Rendered identifier of the affected node.
        node: String,
    },

    /// Discovery reported issues at or above the critical severity
    /// threshold; the affected root did not execute.
    #[error("{count} discovery issue(s) at or above {threshold:?}: {summary}")]
    DiscoveryAborted {
        /// How many issues crossed the threshold.
        count: usize,
        /// The configured threshold.
        threshold: Severity,
        /// One line per issue, joined with "; ".
        summary: String,
    },
}

impl EngineError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use testvisor::EngineError;
    ///
    /// let err = EngineError::CycleDetected { path: "a > b > a".into() };
    /// assert_eq!(err.as_label(), "engine_cycle_detected");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            EngineError::MalformedId { .. } => "engine_malformed_id",
            EngineError::DuplicateId { .. } => "engine_duplicate_id",
            EngineError::CycleDetected { .. } => "engine_cycle_detected",
            EngineError::ChainNeverInvoked { .. } => "engine_chain_never_invoked",
            EngineError::ChainInvokedTwice { .. } => "engine_chain_invoked_twice",
            EngineError::DiscoveryAborted { .. } => "engine_discovery_aborted",
        }
    }
}

/// Classification of a [`TestFailure`].
///
/// Used by the lifecycle to decide how a failure is reported and by
/// listeners that want stable labels without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// An error returned (or a panic raised) by user code.
    UserCode,
    /// The body exceeded its configured timeout.
    Timeout,
    /// The execution was cancelled cooperatively.
    Canceled,
    /// An engine protocol was violated (see [`EngineError`]).
    Protocol,
}

impl FailureKind {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            FailureKind::UserCode => "failure_user_code",
            FailureKind::Timeout => "failure_timeout",
            FailureKind::Canceled => "failure_canceled",
            FailureKind::Protocol => "failure_protocol",
        }
    }
}

/// # A failure produced while executing a node.
///
/// Carries a message, a [`FailureKind`], and a `suppressed` list: when a
/// sequence of steps fails more than once (a before hook *and* the body,
/// say), the first failure is reported and every later one is attached
/// here in order, so nothing is lost.
///
/// # Example
/// ```
/// use testvisor::TestFailure;
///
/// let mut first = TestFailure::new("before hook failed");
/// first.suppress(TestFailure::new("after hook failed"));
///
/// assert_eq!(first.suppressed.len(), 1);
/// assert_eq!(first.to_string(), "before hook failed");
/// ```
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct TestFailure {
    /// Human-readable description of the failure.
    pub message: String,
    /// What produced this failure.
    pub kind: FailureKind,
    /// Later failures from the same step sequence, in occurrence order.
    pub suppressed: Vec<TestFailure>,
}

impl TestFailure {
    /// Creates a user-code failure with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: FailureKind::UserCode,
            suppressed: Vec::new(),
        }
    }

    /// Creates a timeout failure.
    pub fn timeout(timeout: std::time::Duration) -> Self {
        Self {
            message: format!("timed out after {timeout:?}"),
            kind: FailureKind::Timeout,
            suppressed: Vec::new(),
        }
    }

    /// Creates a cancellation failure.
    pub fn canceled() -> Self {
        Self {
            message: "execution cancelled".to_string(),
            kind: FailureKind::Canceled,
            suppressed: Vec::new(),
        }
    }

    /// Wraps an [`EngineError`] as a node-level protocol failure.
    pub fn protocol(err: EngineError) -> Self {
        Self {
            message: err.to_string(),
            kind: FailureKind::Protocol,
            suppressed: Vec::new(),
        }
    }

    /// Converts a caught panic payload into a failure.
    ///
    /// Downcasts `&str` and `String` payloads; anything else becomes
    /// `"unknown panic"`.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let info = {
            let any = &*payload;
            if let Some(msg) = any.downcast_ref::<&'static str>() {
                (*msg).to_string()
            } else if let Some(msg) = any.downcast_ref::<String>() {
                msg.clone()
            } else {
                "unknown panic".to_string()
            }
        };
        Self {
            message: format!("panicked: {info}"),
            kind: FailureKind::UserCode,
            suppressed: Vec::new(),
        }
    }

    /// Attaches a later failure to this one.
    pub fn suppress(&mut self, later: TestFailure) {
        self.suppressed.push(later);
    }

    /// True for failures that represent cooperative cancellation rather
    /// than an actual error.
    pub fn is_canceled(&self) -> bool {
        matches!(self.kind, FailureKind::Canceled)
    }

    /// True for engine protocol violations.
    pub fn is_protocol(&self) -> bool {
        matches!(self.kind, FailureKind::Protocol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_engine_error_labels_are_stable() {
        let err = EngineError::ChainNeverInvoked {
            node: "[engine:demo]".into(),
        };
        assert_eq!(err.as_label(), "engine_chain_never_invoked");
        let err = EngineError::MalformedId {
            text: "nope".into(),
            reason: "missing brackets".into(),
        };
        assert_eq!(err.as_label(), "engine_malformed_id");
    }

    #[test]
    fn test_suppressed_failures_preserve_order() {
        let mut first = TestFailure::new("one");
        first.suppress(TestFailure::new("two"));
        first.suppress(TestFailure::new("three"));
        let order: Vec<&str> = first.suppressed.iter().map(|f| f.message.as_str()).collect();
        assert_eq!(order, vec!["two", "three"]);
    }

    #[test]
    fn test_panic_payload_downcast() {
        let f = TestFailure::from_panic(Box::new("boom"));
        assert_eq!(f.message, "panicked: boom");
        let f = TestFailure::from_panic(Box::new(String::from("again")));
        assert_eq!(f.message, "panicked: again");
        let f = TestFailure::from_panic(Box::new(42_u32));
        assert_eq!(f.message, "panicked: unknown panic");
    }

    #[test]
    fn test_timeout_failure_kind() {
        let f = TestFailure::timeout(Duration::from_secs(3));
        assert_eq!(f.kind.as_label(), "failure_timeout");
        assert!(f.message.contains("3s"));
    }
}
