//! # Core listener trait.
//!
//! `TestListener` is the extension point for observing a run: reporters,
//! progress bars, IDE integrations. Listeners are external to the engine
//! and may format, print, or aggregate independently.
//!
//! ## Contract
//! - `on_event` is awaited in dispatch order; slow listeners slow the
//!   run down rather than losing events.
//! - A panicking listener is caught, logged with its name, and skipped
//!   for that event only; remaining listeners still receive the event.

use async_trait::async_trait;

use crate::events::ExecutionEvent;

/// Contract for execution-event observers.
#[async_trait]
pub trait TestListener: Send + Sync + 'static {
    /// Handles a single event.
    async fn on_event(&self, event: &ExecutionEvent);

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
