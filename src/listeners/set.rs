//! # Ordered event fan-out to multiple listeners.
//!
//! [`ListenerSet`] broadcasts one event to every registered listener.
//!
//! ## Rules
//! - **Start-type** events (`DynamicallyRegistered`, `Started`,
//!   `ReportingEntry`) are delivered in list order.
//! - **Finish-type** events (`Finished`, `Skipped`) are delivered in
//!   reverse list order, mirroring the before/after nesting rule:
//!   the listener that saw a start first sees the matching finish last.
//! - **Isolation**: a panicking listener is caught (`catch_unwind`),
//!   logged with its name and the event kind, and does not stop delivery
//!   to the remaining listeners. Unrecoverable errors (allocation
//!   failure and friends) abort the process and are deliberately not
//!   caught.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::warn;

use crate::events::ExecutionEvent;
use crate::listeners::TestListener;

/// Fan-out coordinator for execution-event listeners.
pub struct ListenerSet {
    listeners: Vec<Arc<dyn TestListener>>,
}

impl ListenerSet {
    /// Creates a set over the given listeners; list order is dispatch
    /// order for start-type events.
    #[must_use]
    pub fn new(listeners: Vec<Arc<dyn TestListener>>) -> Self {
        Self { listeners }
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// True if no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Delivers one event to every listener, isolating per-listener
    /// panics.
    pub async fn dispatch(&self, event: &ExecutionEvent) {
        if event.kind.is_finish_type() {
            for listener in self.listeners.iter().rev() {
                Self::deliver(listener, event).await;
            }
        } else {
            for listener in &self.listeners {
                Self::deliver(listener, event).await;
            }
        }
    }

    async fn deliver(listener: &Arc<dyn TestListener>, event: &ExecutionEvent) {
        let fut = listener.on_event(event);
        if let Err(payload) = AssertUnwindSafe(fut).catch_unwind().await {
            let info = {
                let any = &*payload;
                if let Some(msg) = any.downcast_ref::<&'static str>() {
                    (*msg).to_string()
                } else if let Some(msg) = any.downcast_ref::<String>() {
                    msg.clone()
                } else {
                    "unknown panic".to_string()
                }
            };
            warn!(
                listener = listener.name(),
                method = "on_event",
                kind = ?event.kind,
                node = %event.node,
                panic = %info,
                "listener panicked; continuing with remaining listeners"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::events::EventKind;
    use crate::ident::UniqueId;

    struct Recording {
        label: &'static str,
        log: Arc<Mutex<Vec<(&'static str, EventKind)>>>,
        panic_on: Option<EventKind>,
    }

    #[async_trait]
    impl TestListener for Recording {
        async fn on_event(&self, event: &ExecutionEvent) {
            if self.panic_on == Some(event.kind) {
                panic!("listener {} refused {:?}", self.label, event.kind);
            }
            self.log.lock().unwrap().push((self.label, event.kind));
        }

        fn name(&self) -> &'static str {
            self.label
        }
    }

    fn demo_event(kind: EventKind) -> ExecutionEvent {
        ExecutionEvent::new(kind, UniqueId::root("engine", "demo").unwrap())
    }

    fn recording_set(
        log: &Arc<Mutex<Vec<(&'static str, EventKind)>>>,
        panic_on: Option<EventKind>,
    ) -> ListenerSet {
        ListenerSet::new(vec![
            Arc::new(Recording {
                label: "first",
                log: log.clone(),
                panic_on,
            }),
            Arc::new(Recording {
                label: "second",
                log: log.clone(),
                panic_on: None,
            }),
        ])
    }

    #[tokio::test]
    async fn test_start_events_in_list_order_finish_reversed() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let set = recording_set(&log, None);

        set.dispatch(&demo_event(EventKind::Started)).await;
        set.dispatch(&demo_event(EventKind::Finished)).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                ("first", EventKind::Started),
                ("second", EventKind::Started),
                ("second", EventKind::Finished),
                ("first", EventKind::Finished),
            ]
        );
    }

    #[tokio::test]
    async fn test_panicking_listener_does_not_block_the_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let set = recording_set(&log, Some(EventKind::Started));

        set.dispatch(&demo_event(EventKind::Started)).await;

        // "first" panicked and recorded nothing; "second" still got the
        // event.
        assert_eq!(*log.lock().unwrap(), vec![("second", EventKind::Started)]);
    }
}
