//! # Discovery boundary types.
//!
//! The engine never scans sources itself; an external discovery subsystem
//! hands it pre-built descriptor trees. This module defines the shape of
//! that hand-off:
//!
//! - [`RootSpec`] — one root descriptor plus the issues discovery noted
//!   while building it.
//! - [`DiscoveryIssue`] / [`Severity`] — severity-graded problems; only
//!   issues at or above the configured critical threshold abort a root,
//!   the rest are logged.

use std::fmt;
use std::sync::Arc;

use crate::ident::UniqueId;
use crate::tree::TestNode;

/// Severity of a discovery issue, ordered `Info < Warning < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational; never aborts a root.
    Info,
    /// Suspicious but tolerable.
    Warning,
    /// A real problem with the discovered tree.
    Error,
}

impl Severity {
    /// Parses a severity from its lowercase configuration name.
    ///
    /// Returns `None` for unknown names.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "info" => Some(Severity::Info),
            "warning" => Some(Severity::Warning),
            "error" => Some(Severity::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A problem noted by the external discovery subsystem.
#[derive(Debug, Clone)]
pub struct DiscoveryIssue {
    /// How bad it is.
    pub severity: Severity,
    /// Human-readable description.
    pub message: String,
    /// The descriptor the issue relates to, if any.
    pub source: Option<UniqueId>,
}

impl DiscoveryIssue {
    /// Creates an issue with no source descriptor.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            source: None,
        }
    }

    /// Attaches the descriptor the issue relates to.
    pub fn with_source(mut self, source: UniqueId) -> Self {
        self.source = Some(source);
        self
    }

    /// Renders the issue as a single log/summary line.
    pub fn as_line(&self) -> String {
        match &self.source {
            Some(id) => format!("[{}] {} ({})", self.severity, self.message, id),
            None => format!("[{}] {}", self.severity, self.message),
        }
    }
}

/// One root descriptor tree handed to the engine, together with the
/// issues discovery collected while building it.
#[derive(Clone)]
pub struct RootSpec {
    /// The root descriptor. Children hang off it recursively.
    pub root: Arc<TestNode>,
    /// Issues noted during discovery, any severity.
    pub issues: Vec<DiscoveryIssue>,
}

impl RootSpec {
    /// Creates a spec with no discovery issues.
    pub fn new(root: Arc<TestNode>) -> Self {
        Self {
            root,
            issues: Vec::new(),
        }
    }

    /// Creates a spec carrying discovery issues.
    pub fn with_issues(root: Arc<TestNode>, issues: Vec<DiscoveryIssue>) -> Self {
        Self { root, issues }
    }
}
