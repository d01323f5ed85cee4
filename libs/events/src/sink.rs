//! Event sinks.

use std::sync::Mutex;

use tracing::{info, warn};

use crate::types::{Event, EventKind};

/// Destination for operator events.
///
/// Publishing is best-effort and must not block for long.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: Event);
}

/// Sink that writes events to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: Event) {
        match event.kind {
            EventKind::Normal => info!(
                object = %event.object,
                reason = %event.reason,
                "{}",
                event.message
            ),
            EventKind::Warning => warn!(
                object = %event.object,
                reason = %event.reason,
                "{}",
                event.message
            ),
        }
    }
}

/// Sink that keeps every event in memory, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    /// Create an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All events published so far, oldest first.
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Reasons of all events published so far, oldest first.
    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
