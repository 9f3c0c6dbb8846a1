//! # Launcher: owns the whole run.
//!
//! The [`Launcher`] accepts one or more root descriptor trees (as
//! [`RootSpec`]s), gates each on its discovery issues, validates the
//! tree invariants, and drives execution root by root, merging every
//! branch's events into the one listener stream shared by the run.
//!
//! ## Per-root flow
//! ```text
//! RootSpec ─► issues ≥ critical severity? ──► DiscoveryAborted outcome
//!     │                                       (aggregated, lists every issue)
//!     ▼
//! validate_tree (acyclic, duplicate-free) ──► EngineError outcome
//!     │
//!     ▼
//! execute_node(root) ─► events ─► ListenerSet ─► RunTracker
//!     │
//!     ▼
//! RootOutcome { totals }
//! ```
//!
//! ## Example
//! ```
//! use std::sync::Arc;
//! use testvisor::{
//!     Launcher, RootSpec, TestNode, UniqueId,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let root_id = UniqueId::root("engine", "demo").unwrap();
//!     let root = TestNode::container(root_id.clone(), "demo").arc();
//!     root.add_child(
//!         TestNode::test(
//!             root_id.append("test", "it-works").unwrap(),
//!             "it works",
//!             |_ctx| async { Ok(()) },
//!         )
//!         .arc(),
//!     );
//!
//!     let launcher = Launcher::builder().build();
//!     let report = launcher.run(vec![RootSpec::new(root)]).await;
//!     assert!(report.is_success());
//! }
//! ```

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{Config, ConfigParameters};
use crate::core::lifecycle::{ExecutionScope, execute_node};
use crate::discovery::{RootSpec, Severity};
use crate::error::EngineError;
use crate::extensions::ExtensionRegistry;
use crate::ident::UniqueId;
use crate::listeners::{ListenerSet, RunTotals, RunTracker, TestListener};
use crate::output::{StreamInterceptor, StreamTarget};
use crate::store::Store;
use crate::tree::validate_tree;

/// Aggregated outcome of one root: its tallies, or the engine error that
/// aborted it before execution.
#[derive(Debug, Clone)]
pub struct RootOutcome {
    /// Identifier of the root descriptor.
    pub root: UniqueId,
    /// Tallies on success; the aborting error otherwise.
    pub outcome: Result<RunTotals, EngineError>,
}

/// One aggregated outcome per root, in submission order.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Per-root outcomes.
    pub roots: Vec<RootOutcome>,
}

impl RunReport {
    /// True if every root executed and nothing failed.
    pub fn is_success(&self) -> bool {
        self.roots
            .iter()
            .all(|r| matches!(&r.outcome, Ok(totals) if totals.failed == 0))
    }

    /// Total failed nodes across all executed roots.
    pub fn total_failed(&self) -> u64 {
        self.roots
            .iter()
            .filter_map(|r| r.outcome.as_ref().ok())
            .map(|t| t.failed)
            .sum()
    }
}

/// Builder for a [`Launcher`].
#[derive(Default)]
pub struct LauncherBuilder {
    parameters: ConfigParameters,
    config: Option<Config>,
    listeners: Vec<Arc<dyn TestListener>>,
    cancellation: Option<CancellationToken>,
}

impl LauncherBuilder {
    /// Creates a builder with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the host-resolved configuration parameters. Unless
    /// [`with_config`](Self::with_config) overrides it, the engine
    /// config is derived from these.
    pub fn with_parameters(mut self, parameters: ConfigParameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Overrides the derived engine configuration.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Registers event listeners; list order is dispatch order for
    /// start-type events.
    pub fn with_listeners(mut self, listeners: Vec<Arc<dyn TestListener>>) -> Self {
        self.listeners = listeners;
        self
    }

    /// Couples the run to an external cancellation token: cancel it and
    /// the engine stops dispatching at the next safe point.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Builds the launcher, wiring the run tracker into the listener
    /// set.
    pub fn build(self) -> Launcher {
        let config = self
            .config
            .unwrap_or_else(|| Config::from_parameters(&self.parameters));
        let tracker = RunTracker::new();
        let mut listeners = self.listeners;
        listeners.push(Arc::new(tracker.clone()));
        Launcher {
            config: Arc::new(config),
            parameters: Arc::new(self.parameters),
            listeners: Arc::new(ListenerSet::new(listeners)),
            tracker,
            token: self.cancellation.unwrap_or_default(),
        }
    }
}

/// Drives the execution of one or more descriptor trees.
pub struct Launcher {
    config: Arc<Config>,
    parameters: Arc<ConfigParameters>,
    listeners: Arc<ListenerSet>,
    tracker: RunTracker,
    token: CancellationToken,
}

impl Launcher {
    /// Entry point for [`LauncherBuilder`].
    pub fn builder() -> LauncherBuilder {
        LauncherBuilder::new()
    }

    /// The effective configuration of this launcher.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs every root and reports one aggregated outcome per root.
    ///
    /// Roots run sequentially; subtrees within a root run concurrently
    /// as permitted by configuration and declared locks. Events from all
    /// branches merge into the one listener stream.
    pub async fn run(&self, roots: Vec<RootSpec>) -> RunReport {
        self.install_interceptors();
        let semaphore = self
            .config
            .concurrency_limit()
            .map(|n| Arc::new(Semaphore::new(n)));

        let mut outcomes = Vec::with_capacity(roots.len());
        for spec in roots {
            let root_id = spec.root.id().clone();
            let outcome = self.run_root(spec, &semaphore).await;
            outcomes.push(RootOutcome {
                root: root_id,
                outcome,
            });
        }

        self.uninstall_interceptors();
        RunReport { roots: outcomes }
    }

    async fn run_root(
        &self,
        spec: RootSpec,
        semaphore: &Option<Arc<Semaphore>>,
    ) -> Result<RunTotals, EngineError> {
        let critical = spec
            .issues
            .iter()
            .filter(|i| i.severity >= self.config.critical_severity)
            .count();
        if critical > 0 {
            let summary = spec
                .issues
                .iter()
                .map(|i| i.as_line())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(EngineError::DiscoveryAborted {
                count: critical,
                threshold: self.config.critical_severity,
                summary,
            });
        }
        for issue in &spec.issues {
            match issue.severity {
                Severity::Info => debug!(root = %spec.root.id(), issue = %issue.as_line(), "discovery issue"),
                _ => warn!(root = %spec.root.id(), issue = %issue.as_line(), "discovery issue"),
            }
        }

        validate_tree(&spec.root)?;

        self.tracker.reset();
        let scope = ExecutionScope {
            registry: ExtensionRegistry::root(Vec::new()),
            store: Store::root(),
            config: Arc::clone(&self.config),
            parameters: Arc::clone(&self.parameters),
            listeners: Arc::clone(&self.listeners),
            locks: Vec::new(),
            semaphore: semaphore.clone(),
            token: self.token.child_token(),
        };
        execute_node(spec.root, scope).await;
        Ok(self.tracker.snapshot())
    }

    fn install_interceptors(&self) {
        if self.config.capture_stdout {
            StreamInterceptor::install(StreamTarget::Stdout, self.config.max_capture_bytes);
        }
        if self.config.capture_stderr {
            StreamInterceptor::install(StreamTarget::Stderr, self.config.max_capture_bytes);
        }
    }

    fn uninstall_interceptors(&self) {
        if self.config.capture_stdout {
            StreamInterceptor::uninstall(StreamTarget::Stdout);
        }
        if self.config.capture_stderr {
            StreamInterceptor::uninstall(StreamTarget::Stderr);
        }
    }
}
