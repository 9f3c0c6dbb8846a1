//! # Namespaced, parent-delegating key/value store.
//!
//! Extensions share state across lifecycle steps through a [`Store`]
//! scoped to one execution context. Stores link to the parent context's
//! store: lookups walk local → root, writes always land locally, and
//! teardown closes owned closeable entries most-recently-added first.
//!
//! [`Namespace`]s partition the key space so unrelated extensions cannot
//! collide on the same key.

mod namespace;
mod scoped;

pub use namespace::Namespace;
pub use scoped::{CloseableResource, Store, StoredValue};
