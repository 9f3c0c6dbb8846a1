//! # Terminal result of one node's execution.

use crate::error::TestFailure;

/// The aggregated outcome of one node, reported with the `Finished`
/// event.
///
/// A container's result covers its own hooks and store teardown only;
/// child failures are reported on the children.
#[derive(Debug, Clone)]
pub enum ExecutionResult {
    /// Every step of the node's lifecycle completed.
    Successful,
    /// At least one step failed; the failure aggregates the rest as
    /// suppressed.
    Failed(TestFailure),
}

impl ExecutionResult {
    /// Builds a result from an aggregated lifecycle outcome.
    pub fn from_outcome(outcome: Result<(), TestFailure>) -> Self {
        match outcome {
            Ok(()) => ExecutionResult::Successful,
            Err(failure) => ExecutionResult::Failed(failure),
        }
    }

    /// True if the node failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, ExecutionResult::Failed(_))
    }

    /// The failure, if any.
    pub fn failure(&self) -> Option<&TestFailure> {
        match self {
            ExecutionResult::Successful => None,
            ExecutionResult::Failed(f) => Some(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_mapping() {
        assert!(!ExecutionResult::from_outcome(Ok(())).is_failure());
        let res = ExecutionResult::from_outcome(Err(TestFailure::new("boom")));
        assert_eq!(res.failure().unwrap().message, "boom");
    }
}
