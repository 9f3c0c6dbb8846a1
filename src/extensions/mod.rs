//! # Extension model.
//!
//! An [`Extension`] is a pluggable hook wrapping the lifecycle of every
//! node it applies to: conditional skipping, before/after callbacks,
//! invocation interception, child ordering, and pre-interrupt
//! diagnostics. Extensions are resolved by the external discovery
//! subsystem and handed to the engine as already-constructed instances;
//! the engine never inspects source metadata.
//!
//! [`ExtensionRegistry`] resolves which extensions apply to a node
//! (its own plus everything inherited), and in which order.
//! [`ExtensionContext`] is the per-node view extensions receive: the
//! descriptor, the scoped store, configuration parameters, and report
//! publishing. The interceptor chain lives in [`chain`].

pub mod chain;

mod context;
mod extension;
mod registry;

pub use chain::{ChainOutcome, Invocation, InvocationHandle, InvocationKind, invoke_chain};
pub use context::ExtensionContext;
pub use extension::{ConditionResult, Extension};
pub use registry::{ExtensionRegistry, Order, Registration};
