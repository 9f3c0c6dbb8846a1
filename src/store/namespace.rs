//! # Store namespaces.
//!
//! A [`Namespace`] scopes store keys so unrelated extensions cannot
//! collide. Extensions either share the reserved [`Namespace::global`]
//! namespace deliberately, build one from their own parts with
//! [`Namespace::create`], or take a collision-free per-instance one from
//! [`Namespace::unique`].

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Counter backing [`Namespace::unique`].
static UNIQUE_SEQ: AtomicU64 = AtomicU64::new(0);

/// A scoping key partitioning the store.
///
/// Equality and hashing are structural over the part sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    parts: Vec<String>,
}

impl Namespace {
    /// The reserved, engine-wide default namespace.
    pub fn global() -> Self {
        Self {
            parts: vec!["__global__".to_string()],
        }
    }

    /// Builds a namespace from the given parts.
    ///
    /// Two calls with equal parts produce equal namespaces; pick parts
    /// that identify your extension (a crate or type path works well).
    pub fn create<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns a namespace guaranteed not to equal any other, for
    /// per-extension-instance state.
    pub fn unique() -> Self {
        let n = UNIQUE_SEQ.fetch_add(1, AtomicOrdering::Relaxed);
        Self {
            parts: vec!["__unique__".to_string(), n.to_string()],
        }
    }
}
