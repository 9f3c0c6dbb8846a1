//! # Descriptor tree.
//!
//! The engine consumes a pre-built tree of [`TestNode`]s: containers,
//! tests, or both at once. Parents own their children; a child keeps a
//! weak back-pointer for lookup only. Children may be appended during
//! execution (dynamic registration) but never removed.
//!
//! [`validate_tree`] checks the two structural invariants before any
//! execution: the graph is acyclic and no identifier appears at two
//! different paths from the root.

mod descriptor;
mod validate;

pub use descriptor::{DynamicRegistrar, NodeKind, TestBody, TestContext, TestNode};
pub use validate::validate_tree;

pub(crate) use descriptor::CaptureRoute;
