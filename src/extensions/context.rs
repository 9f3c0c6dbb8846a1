//! # Per-node extension context.
//!
//! The view an [`Extension`](crate::extensions::Extension) (and a test
//! body) gets of the node currently executing: the descriptor, the
//! scoped store, the host's configuration parameters, report-entry
//! publishing, and the optional per-node output directory.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ConfigParameters;
use crate::error::TestFailure;
use crate::events::{EventKind, ExecutionEvent};
use crate::listeners::ListenerSet;
use crate::store::Store;
use crate::tree::TestNode;

/// Execution context handed to extensions.
///
/// One context exists per node execution; child contexts get their own
/// instance (with their own store scope) during Prepare.
pub struct ExtensionContext {
    node: Arc<TestNode>,
    store: Arc<Store>,
    parameters: Arc<ConfigParameters>,
    listeners: Arc<ListenerSet>,
    output_root: Option<PathBuf>,
}

impl ExtensionContext {
    pub(crate) fn new(
        node: Arc<TestNode>,
        store: Arc<Store>,
        parameters: Arc<ConfigParameters>,
        listeners: Arc<ListenerSet>,
        output_root: Option<PathBuf>,
    ) -> Self {
        Self {
            node,
            store,
            parameters,
            listeners,
            output_root,
        }
    }

    /// The descriptor currently executing.
    pub fn node(&self) -> &Arc<TestNode> {
        &self.node
    }

    /// The store scoped to this execution context. Lookups delegate to
    /// ancestor scopes; writes stay local.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// The host-resolved configuration parameters (read-only).
    pub fn parameters(&self) -> &ConfigParameters {
        &self.parameters
    }

    /// Publishes key/value report entries to every listener.
    pub async fn publish_entries(&self, entries: Vec<(String, String)>) {
        let event = ExecutionEvent::new(EventKind::ReportingEntry, self.node.id().clone())
            .with_display_name(self.node.display_name())
            .with_entries(entries);
        self.listeners.dispatch(&event).await;
    }

    /// Publishes a single key/value report entry.
    pub async fn publish_entry(&self, key: impl Into<String>, value: impl Into<String>) {
        self.publish_entries(vec![(key.into(), value.into())]).await;
    }

    /// The per-node output directory, created on first request.
    ///
    /// Returns `Ok(None)` when the run has no output root configured.
    /// The directory name derives deterministically from the node's
    /// identifier with filesystem-unsafe characters replaced.
    pub fn output_dir(&self) -> Result<Option<PathBuf>, TestFailure> {
        let Some(root) = &self.output_root else {
            return Ok(None);
        };
        let dir = root.join(self.node.id().to_path_component());
        std::fs::create_dir_all(&dir)
            .map_err(|e| TestFailure::new(format!("failed to create output dir {dir:?}: {e}")))?;
        Ok(Some(dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::UniqueId;

    fn context(output_root: Option<PathBuf>) -> ExtensionContext {
        let node = TestNode::container(
            UniqueId::root("engine", "demo")
                .unwrap()
                .append("test", "weird name")
                .unwrap(),
            "weird name",
        )
        .arc();
        ExtensionContext::new(
            node,
            Store::root(),
            Arc::new(ConfigParameters::new()),
            Arc::new(ListenerSet::new(Vec::new())),
            output_root,
        )
    }

    #[test]
    fn test_output_dir_absent_without_root() {
        let ctx = context(None);
        assert!(ctx.output_dir().unwrap().is_none());
    }

    #[test]
    fn test_output_dir_is_deterministic_and_sanitized() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(Some(root.path().to_path_buf()));
        let dir = ctx.output_dir().unwrap().unwrap();
        assert_eq!(dir, root.path().join("demo_weird-name"));
        assert!(dir.is_dir());
        // Requesting again yields the same path.
        assert_eq!(ctx.output_dir().unwrap().unwrap(), dir);
    }
}
