//! # Extension registry.
//!
//! Resolves which extensions apply to a node and in which order. Each
//! registration remembers its originating descriptor so diagnostics can
//! say *which* node contributed a misbehaving extension.
//!
//! ## Rules
//! - Registries nest: a child registry is a new accumulator seeded with
//!   (never mutating) the parent's view.
//! - [`Order::Forward`] = parent registrations (in registration order)
//!   followed by local registrations (in registration order).
//! - [`Order::Backward`] = the exact reverse sequence.
//!
//! This guarantees that setup hooks run outer-to-inner and teardown
//! hooks run inner-to-outer: last registered, first torn down.

use std::sync::Arc;

use crate::extensions::Extension;
use crate::ident::UniqueId;

/// Direction extensions are applied in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Outer-to-inner: setup hooks.
    Forward,
    /// Inner-to-outer: teardown hooks.
    Backward,
}

/// One registered extension and the descriptor that contributed it.
#[derive(Clone)]
pub struct Registration {
    extension: Arc<dyn Extension>,
    origin: UniqueId,
}

impl Registration {
    /// Creates a registration record.
    pub fn new(extension: Arc<dyn Extension>, origin: UniqueId) -> Self {
        Self { extension, origin }
    }

    /// The registered extension.
    pub fn extension(&self) -> &Arc<dyn Extension> {
        &self.extension
    }

    /// The descriptor that contributed it.
    pub fn origin(&self) -> &UniqueId {
        &self.origin
    }
}

/// Nested accumulator of extension registrations.
pub struct ExtensionRegistry {
    parent: Option<Arc<ExtensionRegistry>>,
    local: Vec<Registration>,
}

impl ExtensionRegistry {
    /// Creates a root registry from the given registrations.
    pub fn root(local: Vec<Registration>) -> Arc<Self> {
        Arc::new(Self {
            parent: None,
            local,
        })
    }

    /// Creates a child registry seeing `parent`'s registrations plus its
    /// own. The parent is shared, never mutated.
    pub fn child_of(parent: &Arc<ExtensionRegistry>, local: Vec<Registration>) -> Arc<Self> {
        Arc::new(Self {
            parent: Some(Arc::clone(parent)),
            local,
        })
    }

    /// Registrations visible to this registry, in application order.
    pub fn stream(&self, order: Order) -> Vec<Registration> {
        let mut forward = Vec::new();
        self.collect_forward(&mut forward);
        if order == Order::Backward {
            forward.reverse();
        }
        forward
    }

    fn collect_forward(&self, into: &mut Vec<Registration>) {
        if let Some(parent) = &self.parent {
            parent.collect_forward(into);
        }
        into.extend(self.local.iter().cloned());
    }
}
