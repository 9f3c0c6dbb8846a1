//! # Resource locks and execution modes.
//!
//! A descriptor may declare [`ResourceLock`]s naming shared resources it
//! touches. The scheduler never dispatches two lock-conflicting nodes
//! concurrently, so user code needs no runtime locking of its own.
//!
//! ## Conflict rules
//! - Two `Read` locks on the same key are compatible.
//! - Any overlap involving `ReadWrite` conflicts.
//! - The [global](ResourceLock::global) lock conflicts with everything;
//!   a node holding it runs alone.

use std::fmt;

/// Access mode of a [`ResourceLock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared access; compatible with other readers of the same key.
    Read,
    /// Exclusive access; conflicts with any other lock on the same key.
    ReadWrite,
}

/// Key reserved for the global lock.
const GLOBAL_KEY: &str = "__global__";

/// A named, read/write-moded token declared by a node to prevent unsafe
/// concurrent execution with conflicting siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceLock {
    key: String,
    mode: LockMode,
}

impl ResourceLock {
    /// Shared lock on `key`.
    pub fn read(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            mode: LockMode::Read,
        }
    }

    /// Exclusive lock on `key`.
    pub fn read_write(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            mode: LockMode::ReadWrite,
        }
    }

    /// The global lock: the holder runs exclusively, concurrent with
    /// nothing else.
    pub fn global() -> Self {
        Self::read_write(GLOBAL_KEY)
    }

    /// The resource key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The access mode.
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// True for the [global](Self::global) lock.
    pub fn is_global(&self) -> bool {
        self.key == GLOBAL_KEY
    }

    /// True if the two locks must not be held by concurrently running
    /// nodes.
    pub fn conflicts_with(&self, other: &ResourceLock) -> bool {
        if self.is_global() || other.is_global() {
            return true;
        }
        self.key == other.key
            && (self.mode == LockMode::ReadWrite || other.mode == LockMode::ReadWrite)
    }
}

impl fmt::Display for ResourceLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            LockMode::Read => write!(f, "{} (read)", self.key),
            LockMode::ReadWrite => write!(f, "{} (read-write)", self.key),
        }
    }
}

/// True if any lock in `a` conflicts with any lock in `b`.
pub fn lock_sets_conflict(a: &[ResourceLock], b: &[ResourceLock]) -> bool {
    a.iter().any(|la| b.iter().any(|lb| la.conflicts_with(lb)))
}

/// Whether a node's subtree may be dispatched concurrently with its
/// siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Run on the dispatching task, in sibling order.
    Serial,
    /// Eligible for dispatch to the worker pool.
    Concurrent,
}

impl ExecutionMode {
    /// Parses a mode from its lowercase configuration name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "serial" => Some(ExecutionMode::Serial),
            "concurrent" => Some(ExecutionMode::Concurrent),
            _ => None,
        }
    }
}
