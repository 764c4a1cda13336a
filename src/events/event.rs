//! # Resource lifecycle events handed from the watch framework to a broker.
//!
//! The [`EventKind`] enum classifies a change (added, updated, deleted) and
//! [`Payload`] carries the affected [`Snapshot`]s. An [`Event`] is created once
//! per watch callback, consumed by [`Broker::build_envelope`](crate::Broker::build_envelope)
//! and then dropped.
//!
//! ## Wire tokens
//! [`Event::event_type`] returns the value written to the `event_type` envelope
//! header. Consumers match on these strings; they must stay stable.
//!
//! | Kind      | Token       | Message body                          |
//! |-----------|-------------|---------------------------------------|
//! | `Added`   | `"added"`   | the resource                          |
//! | `Updated` | `"updated"` | `{"OldObj": old, "NewObj": new}`      |
//! | `Deleted` | `"deleted"` | the last known state of the resource  |
//!
//! ## Example
//! ```rust
//! use serde_json::json;
//! use fleetcast::{Event, EventKind, Snapshot};
//!
//! let old = Snapshot::new(json!({"id": 1, "state": "Ready"})).unwrap();
//! let new = Snapshot::new(json!({"id": 1, "state": "Allocated"})).unwrap();
//! let ev = Event::on_updated(old, new);
//!
//! assert_eq!(ev.kind(), EventKind::Updated);
//! assert_eq!(ev.event_type(), "updated");
//! assert_eq!(ev.content()["NewObj"]["state"], "Allocated");
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::EventError;

/// Global sequence counter for event ordering in logs.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of resource changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A resource appeared in the cluster.
    Added,
    /// A resource changed; both the previous and the current state are carried.
    Updated,
    /// A resource was removed from the cluster.
    Deleted,
}

impl EventKind {
    /// All kinds, in declaration order.
    pub const ALL: [EventKind; 3] = [EventKind::Added, EventKind::Updated, EventKind::Deleted];

    /// Stable wire token used as the `event_type` header value.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Added => "added",
            EventKind::Updated => "updated",
            EventKind::Deleted => "deleted",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time state of a watched resource, captured as a JSON document.
///
/// A snapshot is never `null` and never an empty object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Snapshot(Value);

impl Snapshot {
    /// Wraps an already-serialized resource.
    pub fn new(value: Value) -> Result<Self, EventError> {
        match &value {
            Value::Null => Err(EventError::EmptyPayload),
            Value::Object(map) if map.is_empty() => Err(EventError::EmptyPayload),
            _ => Ok(Self(value)),
        }
    }

    /// Captures any serializable resource.
    pub fn from_resource<R: Serialize + ?Sized>(resource: &R) -> Result<Self, EventError> {
        Self::new(serde_json::to_value(resource)?)
    }

    /// The `kind` field of the resource, when present (e.g. `"Fleet"`).
    pub fn kind(&self) -> Option<&str> {
        self.0.get("kind").and_then(Value::as_str)
    }

    /// Identity of the resource as `namespace/name` (or just `name` for
    /// cluster-scoped objects). `None` when the snapshot has no `metadata.name`.
    pub fn key(&self) -> Option<String> {
        let meta = self.0.get("metadata")?;
        let name = meta.get("name").and_then(Value::as_str)?;
        match meta.get("namespace").and_then(Value::as_str) {
            Some(ns) if !ns.is_empty() => Some(format!("{ns}/{name}")),
            _ => Some(name.to_string()),
        }
    }

    /// Borrows the underlying document.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consumes the snapshot and returns the underlying document.
    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Affected resource(s) of an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Added { resource: Snapshot },
    Updated { old: Snapshot, new: Snapshot },
    Deleted { resource: Snapshot },
}

/// Notification about one resource change.
///
/// The kind is fixed at construction; fields are private and exposed through getters.
#[derive(Debug, Clone)]
pub struct Event {
    seq: u64,
    kind: EventKind,
    payload: Payload,
}

impl Event {
    fn with_payload(kind: EventKind, payload: Payload) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            kind,
            payload,
        }
    }

    /// Builds an `Added` event.
    pub fn on_added(resource: Snapshot) -> Self {
        Self::with_payload(EventKind::Added, Payload::Added { resource })
    }

    /// Builds an `Updated` event carrying both states of the resource.
    pub fn on_updated(old: Snapshot, new: Snapshot) -> Self {
        Self::with_payload(EventKind::Updated, Payload::Updated { old, new })
    }

    /// Builds a `Deleted` event.
    pub fn on_deleted(resource: Snapshot) -> Self {
        Self::with_payload(EventKind::Deleted, Payload::Deleted { resource })
    }

    #[inline]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Wire token for the `event_type` header.
    #[inline]
    pub fn event_type(&self) -> &'static str {
        self.kind.as_str()
    }

    /// Monotonic process-wide sequence number.
    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    #[inline]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Resource kind of the affected object (taken from the newest snapshot).
    pub fn resource_kind(&self) -> Option<&str> {
        match &self.payload {
            Payload::Added { resource } | Payload::Deleted { resource } => resource.kind(),
            Payload::Updated { new, .. } => new.kind(),
        }
    }

    /// Message body for an envelope: the underlying resource content,
    /// never the event wrapper itself.
    pub fn content(&self) -> Value {
        match &self.payload {
            Payload::Added { resource } | Payload::Deleted { resource } => resource.0.clone(),
            Payload::Updated { old, new } => json!({
                "OldObj": old.0,
                "NewObj": new.0,
            }),
        }
    }
}
