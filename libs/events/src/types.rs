//! Event type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Reason Constants
// =============================================================================

/// All event reasons as constants.
pub mod reasons {
    // Claim launch
    pub const LAUNCHED: &str = "Launched";
    pub const INSUFFICIENT_CAPACITY: &str = "InsufficientCapacity";
    pub const INSTANCE_LEAKED: &str = "InstanceLeaked";

    // Claim teardown
    pub const TERMINATED: &str = "Terminated";

    // Node class
    pub const NODE_CLASS_NOT_FOUND: &str = "NodeClassNotFound";
}

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EventKind {
    #[default]
    Normal,
    Warning,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Normal => write!(f, "Normal"),
            EventKind::Warning => write!(f, "Warning"),
        }
    }
}

/// Kind of object an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    Claim,
    NodeClass,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectKind::Claim => write!(f, "Claim"),
            ObjectKind::NodeClass => write!(f, "NodeClass"),
        }
    }
}

/// Reference to the object an event is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub name: String,
}

impl ObjectRef {
    pub fn claim(name: impl Into<String>) -> Self {
        Self {
            kind: ObjectKind::Claim,
            name: name.into(),
        }
    }

    pub fn node_class(name: impl Into<String>) -> Self {
        Self {
            kind: ObjectKind::NodeClass,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// A single operator-facing event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,

    /// Severity.
    pub kind: EventKind,

    /// The object this event is about.
    pub object: ObjectRef,

    /// Machine-readable reason (see [`reasons`]).
    pub reason: String,

    /// Human-readable message.
    pub message: String,
}

impl Event {
    /// Create a normal event.
    pub fn normal(object: ObjectRef, reason: &str, message: impl Into<String>) -> Self {
        Self::new(EventKind::Normal, object, reason, message)
    }

    /// Create a warning event.
    pub fn warning(object: ObjectRef, reason: &str, message: impl Into<String>) -> Self {
        Self::new(EventKind::Warning, object, reason, message)
    }

    fn new(kind: EventKind, object: ObjectRef, reason: &str, message: impl Into<String>) -> Self {
        Self {
            occurred_at: Utc::now(),
            kind,
            object,
            reason: reason.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_event() {
        let event = Event::warning(
            ObjectRef::node_class("default"),
            reasons::NODE_CLASS_NOT_FOUND,
            "node class default not found",
        );
        assert_eq!(event.kind, EventKind::Warning);
        assert_eq!(event.reason, "NodeClassNotFound");
        assert_eq!(event.object.to_string(), "NodeClass/default");
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::normal(ObjectRef::claim("web-1"), reasons::LAUNCHED, "launched");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "Normal");
        assert_eq!(json["object"]["kind"], "Claim");
        assert_eq!(json["object"]["name"], "web-1");
        assert_eq!(json["reason"], "Launched");
    }
}
