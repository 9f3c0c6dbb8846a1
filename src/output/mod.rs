//! # Output-stream interception.
//!
//! Captures writes to the process's output streams during a unit's
//! execution so they can be republished as report entries.
//!
//! The interceptor is process-wide state with an explicit
//! install/uninstall lifecycle: [`StreamInterceptor::install`] is
//! guarded per target stream (a second install returns the existing
//! instance), writes always reach the real stream, and capture stacks
//! are per worker thread and nest.

mod buffer;
mod interceptor;

pub use buffer::CaptureBuffer;
pub use interceptor::{CaptureSession, StreamInterceptor, StreamTarget};
