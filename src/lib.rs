//! # testvisor
//!
//! **Testvisor** is a generic test-execution engine for Rust.
//!
//! Given a tree of discovered test units (containers and leaves), it
//! runs each unit through a fixed lifecycle, applies a chain of
//! pluggable extensions around every lifecycle step, shares state across
//! those extensions through a scoped store, aggregates failures without
//! losing any of them, and optionally runs independent subtrees
//! concurrently while respecting declared resource conflicts. The crate
//! is a reusable scheduler/middleware runtime: discovery, test business
//! logic, report formatting, and configuration loading are external
//! collaborators it only meets at interface boundaries.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   RootSpec   │   │   RootSpec   │   │   RootSpec   │
//!     │ (tree + the  │   │              │   │              │
//!     │  discovery   │   │              │   │              │
//!     │  issues)     │   │              │   │              │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Launcher (run orchestrator)                                      │
//! │  - gates discovery issues by severity                             │
//! │  - validates trees (acyclic, duplicate-free)                      │
//! │  - ListenerSet (ordered fan-out to observers)                     │
//! │  - RunTracker (per-root tallies)                                  │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  scheduler   │──►│  lifecycle   │──►│   runner     │
//!     │ (lock-aware  │   │ (per-node    │   │ (chain +     │
//!     │  dispatch)   │   │  state       │   │  timeout +   │
//!     │              │   │  machine)    │   │  capture)    │
//!     └──────────────┘   └──────┬───────┘   └──────┬───────┘
//!                               │                  │
//!                               ▼                  ▼
//!                    ExtensionRegistry    InvocationChain ─► user code
//!                    Store (scoped)       StreamInterceptor
//! ```
//!
//! ### Node lifecycle
//! ```text
//! Prepare ─► ShouldSkip ─┬─► Skipped (terminal)
//!                        └─► Before ─► Execute-or-Descend ─► After ─► Cleanup
//!
//! - containers recurse into children (same machine, recursively)
//! - leaves invoke the interceptor chain around the test body
//! - dynamic children run before After, isolated per-child
//! - failures flow through one FailureCollector per node and are
//!   asserted once: first failure reported, the rest suppressed into it
//! ```
//!
//! ## Features
//! | Area            | Description                                                    | Key types / traits                     |
//! |-----------------|----------------------------------------------------------------|----------------------------------------|
//! | **Listeners**   | Observe the per-node event stream (reporters, IDEs, metrics).  | [`TestListener`], [`ListenerSet`]      |
//! | **Extensions**  | Hook into the lifecycle: skip, before/after, intercept, order. | [`Extension`], [`ExtensionContext`]    |
//! | **Store**       | Namespaced shared state with parent delegation and teardown.   | [`Store`], [`Namespace`]               |
//! | **Concurrency** | Lock-aware parallel dispatch on a bounded worker pool.         | [`ResourceLock`], [`ExecutionMode`]    |
//! | **Errors**      | Typed engine errors; aggregated user-code failures.            | [`EngineError`], [`TestFailure`]       |
//! | **Trees**       | Container/test descriptors, dynamic registration, validation.  | [`TestNode`], [`RootSpec`]             |
//! | **Output**      | Process-wide stream capture with nesting and bounded buffers.  | [`StreamInterceptor`]                  |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogListener`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use testvisor::{
//!     Config, ExecutionMode, Launcher, ResourceLock, RootSpec, TestFailure, TestNode, UniqueId,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let engine = UniqueId::root("engine", "demo").unwrap();
//!     let suite = TestNode::container(engine.append("suite", "math").unwrap(), "math")
//!         .with_lock(ResourceLock::read("shared-table"))
//!         .arc();
//!
//!     suite.add_child(
//!         TestNode::test(
//!             suite.id().append("test", "adds").unwrap(),
//!             "adds",
//!             |_ctx| async {
//!                 if 1 + 1 == 2 {
//!                     Ok(())
//!                 } else {
//!                     Err(TestFailure::new("arithmetic is broken"))
//!                 }
//!             },
//!         )
//!         .arc(),
//!     );
//!
//!     let root = TestNode::container(engine, "demo").arc();
//!     root.add_child(suite);
//!
//!     let mut cfg = Config::default();
//!     cfg.parallel = true;
//!     cfg.max_workers = 4;
//!     cfg.default_mode = ExecutionMode::Concurrent;
//!
//!     let launcher = Launcher::builder().with_config(cfg).build();
//!     let report = launcher.run(vec![RootSpec::new(root)]).await;
//!     assert!(report.is_success());
//! }
//! ```

mod collector;
mod config;
mod core;
mod discovery;
mod error;
mod events;
mod extensions;
mod ident;
mod listeners;
mod locks;
mod output;
mod store;
mod tree;

// ---- Public re-exports ----

pub use collector::FailureCollector;
pub use config::{Config, ConfigParameters, OrderingStrategy};
pub use core::{Launcher, LauncherBuilder, RootOutcome, RunReport};
pub use discovery::{DiscoveryIssue, RootSpec, Severity};
pub use error::{EngineError, FailureKind, TestFailure};
pub use events::{EventKind, ExecutionEvent, ExecutionResult};
pub use extensions::{
    ChainOutcome, ConditionResult, Extension, ExtensionContext, ExtensionRegistry, Invocation,
    InvocationHandle, InvocationKind, Order, Registration, invoke_chain,
};
pub use ident::{Segment, UniqueId};
pub use listeners::{ListenerSet, RunTotals, RunTracker, TestListener};
pub use locks::{ExecutionMode, LockMode, ResourceLock, lock_sets_conflict};
pub use output::{CaptureBuffer, CaptureSession, StreamInterceptor, StreamTarget};
pub use store::{CloseableResource, Namespace, Store, StoredValue};
pub use tree::{DynamicRegistrar, NodeKind, TestBody, TestContext, TestNode, validate_tree};

// Optional: expose a simple built-in log listener (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use listeners::LogListener;
