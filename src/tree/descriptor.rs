//! # Test descriptors.
//!
//! [`TestNode`] represents one container or test unit. Nodes are built
//! once at discovery time (builder-style `with_*` methods, then
//! [`arc`](TestNode::arc)), wired into a tree with
//! [`add_child`](TestNode::add_child), and consumed read-mostly during
//! execution. The only mutation after discovery is appending dynamically
//! registered children.
//!
//! A test body is an async closure receiving a [`TestContext`]: the
//! cancellation token to honor, the extension context for shared state,
//! and a registrar for dynamic children.

use std::fmt;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::TestFailure;
use crate::extensions::{Extension, ExtensionContext};
use crate::ident::UniqueId;
use crate::locks::{ExecutionMode, ResourceLock};
use crate::output::{CaptureSession, StreamInterceptor, StreamTarget};

/// A capture wiring handed to a body: where its writes should land.
pub(crate) type CaptureRoute = (Arc<StreamInterceptor>, Arc<CaptureSession>);

/// Whether a node groups children, runs a body, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Groups children; has no body of its own.
    Container,
    /// Runs a body; has no children of its own (until dynamic
    /// registration).
    Test,
    /// Runs a body, then descends into children.
    ContainerAndTest,
}

impl NodeKind {
    /// True if the node descends into children.
    pub fn is_container(&self) -> bool {
        matches!(self, NodeKind::Container | NodeKind::ContainerAndTest)
    }

    /// True if the node runs a body.
    pub fn is_test(&self) -> bool {
        matches!(self, NodeKind::Test | NodeKind::ContainerAndTest)
    }
}

/// Async, cancelable test body.
pub type TestBody =
    Arc<dyn Fn(TestContext) -> BoxFuture<'static, Result<(), TestFailure>> + Send + Sync>;

/// Collects children registered while a body runs; the lifecycle drains
/// it before the node's After step.
#[derive(Clone, Default)]
pub struct DynamicRegistrar {
    pending: Arc<Mutex<Vec<Arc<TestNode>>>>,
}

impl DynamicRegistrar {
    /// Creates an empty registrar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a child for execution after the current body returns.
    pub fn register(&self, node: Arc<TestNode>) {
        self.pending.lock().expect("registrar lock poisoned").push(node);
    }

    /// Takes everything queued so far, in registration order.
    pub fn drain(&self) -> Vec<Arc<TestNode>> {
        self.pending
            .lock()
            .expect("registrar lock poisoned")
            .drain(..)
            .collect()
    }
}

/// Everything a test body receives.
pub struct TestContext {
    /// Cancellation token to honor: check it at safe points and return
    /// promptly once cancelled.
    pub token: CancellationToken,
    context: Arc<ExtensionContext>,
    registrar: DynamicRegistrar,
    out: Option<CaptureRoute>,
    err: Option<CaptureRoute>,
}

impl TestContext {
    pub(crate) fn new(
        token: CancellationToken,
        context: Arc<ExtensionContext>,
        registrar: DynamicRegistrar,
    ) -> Self {
        Self {
            token,
            context,
            registrar,
            out: None,
            err: None,
        }
    }

    /// Wires the body's writes into active capture sessions.
    pub(crate) fn with_capture(
        mut self,
        out: Option<CaptureRoute>,
        err: Option<CaptureRoute>,
    ) -> Self {
        self.out = out;
        self.err = err;
        self
    }

    /// The extension context of the executing node (store access,
    /// configuration parameters, report publishing).
    pub fn context(&self) -> &Arc<ExtensionContext> {
        &self.context
    }

    /// Registers a dynamic child; it runs after this body returns,
    /// before the node's After step.
    pub fn register(&self, node: Arc<TestNode>) {
        self.registrar.register(node);
    }

    /// Shorthand for `token.is_cancelled()`.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Writes to the intercepted stdout stream (captured when capture is
    /// enabled, always forwarded to the real stream).
    pub fn write_out(&self, data: &[u8]) {
        match (&self.out, StreamInterceptor::installed(StreamTarget::Stdout)) {
            (Some((interceptor, session)), _) => interceptor.write_to(session, data),
            (None, Some(interceptor)) => interceptor.write(data),
            (None, None) => {
                use std::io::Write;
                let _ = std::io::stdout().write_all(data);
            }
        }
    }

    /// Writes to the intercepted stderr stream.
    pub fn write_err(&self, data: &[u8]) {
        match (&self.err, StreamInterceptor::installed(StreamTarget::Stderr)) {
            (Some((interceptor, session)), _) => interceptor.write_to(session, data),
            (None, Some(interceptor)) => interceptor.write(data),
            (None, None) => {
                use std::io::Write;
                let _ = std::io::stderr().write_all(data);
            }
        }
    }
}

/// One container or test unit in the execution tree.
pub struct TestNode {
    id: UniqueId,
    display_name: String,
    kind: NodeKind,
    locks: Vec<ResourceLock>,
    mode: Option<ExecutionMode>,
    timeout: Option<Duration>,
    extensions: Vec<Arc<dyn Extension>>,
    body: Option<TestBody>,
    parent: Mutex<Weak<TestNode>>,
    children: RwLock<Vec<Arc<TestNode>>>,
}

impl TestNode {
    /// Creates a container node.
    pub fn container(id: UniqueId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            kind: NodeKind::Container,
            locks: Vec::new(),
            mode: None,
            timeout: None,
            extensions: Vec::new(),
            body: None,
            parent: Mutex::new(Weak::new()),
            children: RwLock::new(Vec::new()),
        }
    }

    /// Creates a test node with the given async body.
    pub fn test<F, Fut>(id: UniqueId, display_name: impl Into<String>, body: F) -> Self
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), TestFailure>> + Send + 'static,
    {
        let boxed: TestBody = Arc::new(move |ctx| Box::pin(body(ctx)));
        Self {
            id,
            display_name: display_name.into(),
            kind: NodeKind::Test,
            locks: Vec::new(),
            mode: None,
            timeout: None,
            extensions: Vec::new(),
            body: Some(boxed),
            parent: Mutex::new(Weak::new()),
            children: RwLock::new(Vec::new()),
        }
    }

    /// Overrides the kind, e.g. to mark a test that also has children.
    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Declares a required resource lock.
    pub fn with_lock(mut self, lock: ResourceLock) -> Self {
        self.locks.push(lock);
        self
    }

    /// Declares the execution mode (defaults to the configured one).
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Declares a per-node timeout overriding the configured default.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Contributes an extension; it applies to this node and everything
    /// below it.
    pub fn with_extension(mut self, extension: Arc<dyn Extension>) -> Self {
        self.extensions.push(extension);
        self
    }

    /// Finishes building and returns the shareable handle.
    pub fn arc(self) -> Arc<TestNode> {
        Arc::new(self)
    }

    /// Appends `child` to this node's children and sets its parent
    /// back-pointer. Children are never removed.
    pub fn add_child(self: &Arc<Self>, child: Arc<TestNode>) {
        *child.parent.lock().expect("parent lock poisoned") = Arc::downgrade(self);
        self.children
            .write()
            .expect("children lock poisoned")
            .push(child);
    }

    /// The node's identifier.
    pub fn id(&self) -> &UniqueId {
        &self.id
    }

    /// The node's display name.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// The node's kind flag.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Locks declared directly on this node (ancestors' locks are added
    /// by the scheduler).
    pub fn locks(&self) -> &[ResourceLock] {
        &self.locks
    }

    /// The declared execution mode, if any.
    pub fn mode(&self) -> Option<ExecutionMode> {
        self.mode
    }

    /// The declared timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Extensions contributed by this node.
    pub fn extensions(&self) -> &[Arc<dyn Extension>] {
        &self.extensions
    }

    /// The body, for test-kind nodes.
    pub fn body(&self) -> Option<&TestBody> {
        self.body.as_ref()
    }

    /// Snapshot of the current children, in registration order.
    pub fn children(&self) -> Vec<Arc<TestNode>> {
        self.children
            .read()
            .expect("children lock poisoned")
            .clone()
    }

    /// The parent, unless this is a root (or the parent was dropped).
    pub fn parent(&self) -> Option<Arc<TestNode>> {
        self.parent.lock().expect("parent lock poisoned").upgrade()
    }
}

impl fmt::Debug for TestNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestNode")
            .field("id", &self.id.to_string())
            .field("display_name", &self.display_name)
            .field("kind", &self.kind)
            .field("children", &self.children().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(parts: &[(&str, &str)]) -> UniqueId {
        let mut it = parts.iter();
        let (k, v) = it.next().unwrap();
        let mut id = UniqueId::root(*k, *v).unwrap();
        for (k, v) in it {
            id = id.append(*k, *v).unwrap();
        }
        id
    }

    #[test]
    fn test_parent_back_pointer_is_weak() {
        let root = TestNode::container(id(&[("engine", "demo")]), "demo").arc();
        let child = TestNode::container(id(&[("engine", "demo"), ("suite", "a")]), "a").arc();
        root.add_child(child.clone());

        assert_eq!(child.parent().unwrap().display_name(), "demo");
        assert_eq!(root.children().len(), 1);

        drop(root);
        // Parent ownership is not kept alive through the back-pointer.
        assert!(child.parent().is_none());
    }

    #[test]
    fn test_kind_flags() {
        assert!(NodeKind::Container.is_container());
        assert!(!NodeKind::Container.is_test());
        assert!(NodeKind::Test.is_test());
        assert!(NodeKind::ContainerAndTest.is_container());
        assert!(NodeKind::ContainerAndTest.is_test());
    }

    #[test]
    fn test_registrar_drains_in_order() {
        let registrar = DynamicRegistrar::new();
        registrar.register(TestNode::container(id(&[("engine", "a")]), "a").arc());
        registrar.register(TestNode::container(id(&[("engine", "b")]), "b").arc());
        let drained = registrar.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].display_name(), "a");
        assert!(registrar.drain().is_empty());
    }
}
