//! # Engine core.
//!
//! The pieces that drive a run, top-down:
//!
//! - [`Launcher`] (built via [`LauncherBuilder`]) owns the whole run:
//!   gates discovery issues, validates trees, executes each root, and
//!   merges events into one listener stream.
//! - `scheduler` partitions sibling subtrees by declared resource locks
//!   and dispatches the independent ones to the bounded worker pool.
//! - `lifecycle` drives one descriptor through
//!   prepare → skip-check → before → execute-or-descend → after →
//!   cleanup.
//! - `runner` wraps a single test body: interceptor chain, timeout,
//!   cooperative cancellation, output capture.

mod lifecycle;
mod orchestrator;
mod runner;
mod scheduler;

pub use orchestrator::{Launcher, LauncherBuilder, RootOutcome, RunReport};

pub(crate) use lifecycle::{ExecutionScope, execute_node};
