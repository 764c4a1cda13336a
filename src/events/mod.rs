//! Event and envelope data model.
//!
//! ## Contents
//! - [`EventKind`], [`Event`], [`Payload`], [`Snapshot`]: what changed in the cluster
//! - [`Envelope`], [`Header`]: what a broker transmits
//!
//! ```text
//! watch callback ──► Event ──► Broker::build_envelope ──► Envelope ──► Broker::send_message
//! ```

mod envelope;
mod event;

pub use envelope::{Envelope, Header, EVENT_TYPE_HEADER, RESOURCE_KIND_HEADER, TOPIC_HEADER};
pub use event::{Event, EventKind, Payload, Snapshot};
