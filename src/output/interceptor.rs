//! # Process-wide stream interceptor.
//!
//! One [`StreamInterceptor`] exists per intercepted target stream,
//! registered in a process-wide table:
//!
//! ## Rules
//! - [`install`](StreamInterceptor::install) is guarded per target: a
//!   second install detects the existing interceptor and returns it
//!   instead of double-wrapping.
//! - Each worker thread keeps its own capture stack, so captures nest
//!   within one thread: [`capture`](StreamInterceptor::capture) pushes a
//!   buffer, [`consume`](StreamInterceptor::consume) pops it.
//! - [`write`](StreamInterceptor::write) appends to the top buffer of
//!   the calling thread's stack and always forwards to the real stream.
//! - [`uninstall`](StreamInterceptor::uninstall) restores direct output;
//!   it is idempotent.
//!
//! A [`CaptureSession`] records the thread whose stack was pushed, so an
//! async runner that migrated threads between `capture` and `consume`
//! still pops the right stack.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, ThreadId};

use crate::output::CaptureBuffer;

/// Which process stream an interceptor wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamTarget {
    /// The process's standard output.
    Stdout,
    /// The process's standard error.
    Stderr,
}

/// Process-wide installation table, one slot per target stream.
static INSTALLED: OnceLock<Mutex<HashMap<StreamTarget, Arc<StreamInterceptor>>>> = OnceLock::new();

fn installations() -> &'static Mutex<HashMap<StreamTarget, Arc<StreamInterceptor>>> {
    INSTALLED.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Token returned by [`StreamInterceptor::capture`], identifying the
/// pushed buffer's thread stack.
#[derive(Debug)]
pub struct CaptureSession {
    thread: ThreadId,
}

/// Interceptor for one target stream with per-thread nested capture
/// stacks.
pub struct StreamInterceptor {
    target: StreamTarget,
    max_bytes: usize,
    stacks: Mutex<HashMap<ThreadId, Vec<CaptureBuffer>>>,
}

impl StreamInterceptor {
    /// Installs an interceptor for `target`, or returns the already
    /// installed one (its original `max_bytes` wins).
    pub fn install(target: StreamTarget, max_bytes: usize) -> Arc<StreamInterceptor> {
        let mut table = installations().lock().expect("interceptor table poisoned");
        Arc::clone(table.entry(target).or_insert_with(|| {
            Arc::new(StreamInterceptor {
                target,
                max_bytes,
                stacks: Mutex::new(HashMap::new()),
            })
        }))
    }

    /// Returns the installed interceptor for `target`, if any.
    pub fn installed(target: StreamTarget) -> Option<Arc<StreamInterceptor>> {
        installations()
            .lock()
            .expect("interceptor table poisoned")
            .get(&target)
            .cloned()
    }

    /// Removes the interceptor for `target`, restoring direct output.
    /// Calling it again (or without a prior install) is a no-op.
    pub fn uninstall(target: StreamTarget) {
        installations()
            .lock()
            .expect("interceptor table poisoned")
            .remove(&target);
    }

    /// The stream this interceptor wraps.
    pub fn target(&self) -> StreamTarget {
        self.target
    }

    /// Pushes a fresh capture buffer onto the calling thread's stack.
    pub fn capture(&self) -> CaptureSession {
        let thread = thread::current().id();
        let mut stacks = self.stacks.lock().expect("capture stacks poisoned");
        stacks
            .entry(thread)
            .or_default()
            .push(CaptureBuffer::new(self.max_bytes));
        CaptureSession { thread }
    }

    /// Pops the session's buffer and returns its text, trimmed to the
    /// configured maximum (oldest bytes were evicted first).
    ///
    /// Returns an empty string if the stack was already empty.
    pub fn consume(&self, session: &CaptureSession) -> String {
        let mut stacks = self.stacks.lock().expect("capture stacks poisoned");
        let popped = stacks.get_mut(&session.thread).and_then(Vec::pop);
        if let Some(stack) = stacks.get(&session.thread) {
            if stack.is_empty() {
                stacks.remove(&session.thread);
            }
        }
        popped.map(CaptureBuffer::into_string).unwrap_or_default()
    }

    /// Appends `data` to the top buffer of the calling thread's stack
    /// (if one is active) and forwards it unconditionally to the real
    /// stream.
    pub fn write(&self, data: &[u8]) {
        self.append(thread::current().id(), data);
        self.forward(data);
    }

    /// Like [`write`](Self::write), but addresses the stack the session
    /// was captured on. Async executors migrate work between threads;
    /// routing writes through the session keeps them in the buffer they
    /// belong to.
    pub fn write_to(&self, session: &CaptureSession, data: &[u8]) {
        self.append(session.thread, data);
        self.forward(data);
    }

    fn append(&self, thread: ThreadId, data: &[u8]) {
        let mut stacks = self.stacks.lock().expect("capture stacks poisoned");
        if let Some(buf) = stacks.get_mut(&thread).and_then(|s| s.last_mut()) {
            buf.write(data);
        }
    }

    fn forward(&self, data: &[u8]) {
        match self.target {
            StreamTarget::Stdout => {
                let _ = std::io::stdout().write_all(data);
            }
            StreamTarget::Stderr => {
                let _ = std::io::stderr().write_all(data);
            }
        }
    }
}
