//! # Listener fan-out.
//!
//! External observers implement [`TestListener`] and receive every
//! [`ExecutionEvent`](crate::events::ExecutionEvent) of a run through a
//! [`ListenerSet`]. Start-type events are delivered in list order,
//! finish-type events in reverse list order, and a misbehaving listener
//! never stops delivery to the rest.
//!
//! [`RunTracker`] is the engine's own listener: it tallies results so the
//! orchestrator can report one aggregated outcome per root.

mod listener;
mod set;
mod tracker;

pub mod embedded;

pub use listener::TestListener;
pub use set::ListenerSet;
pub use tracker::{RunTotals, RunTracker};

#[cfg(feature = "logging")]
pub use embedded::LogListener;
