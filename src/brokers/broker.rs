//! # Broker contract.
//!
//! Provides [`Broker`], the extension point that turns an [`Event`] into an
//! [`Envelope`] and transmits it to a backend.
//!
//! ## Rules
//! - [`Broker::build_envelope`] is called before [`Broker::send_message`] for every event.
//! - `build_envelope` has no side effects; it only maps the event.
//! - One broker instance is shared by all watchers. Implementations that wrap a
//!   connection that is not safe for concurrent use must serialize access internally.
//! - Failures are reported, never retried by the caller.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use fleetcast::{Broker, Envelope, Event, PublishError};
//!
//! struct Discard;
//!
//! #[async_trait]
//! impl Broker for Discard {
//!     fn build_envelope(&self, event: &Event) -> Result<Envelope, PublishError> {
//!         fleetcast::brokers::base_envelope(event)
//!     }
//!
//!     async fn send_message(&self, _envelope: Envelope) -> Result<(), PublishError> {
//!         Ok(())
//!     }
//!
//!     fn name(&self) -> &'static str { "discard" }
//! }
//! ```

use async_trait::async_trait;

use crate::error::PublishError;
use crate::events::{Envelope, Event, EVENT_TYPE_HEADER, RESOURCE_KIND_HEADER};

/// Pluggable backend for publishing resource events.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Maps an event to an envelope.
    ///
    /// Must set the `event_type` header from [`Event::event_type`] and the
    /// message from [`Event::content`].
    fn build_envelope(&self, event: &Event) -> Result<Envelope, PublishError>;

    /// Transmits an envelope to the backend.
    async fn send_message(&self, envelope: Envelope) -> Result<(), PublishError>;

    /// Returns the broker name used in logs.
    ///
    /// The default uses `type_name::<Self>()`, which can be verbose - override it when possible.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Builds the envelope every backend shares: `event_type` (always),
/// `resource_kind` (when the snapshot has one) and the event content as message.
pub fn base_envelope(event: &Event) -> Result<Envelope, PublishError> {
    let mut envelope = Envelope::new(event.content());
    envelope.add_header(EVENT_TYPE_HEADER, event.event_type());
    if let Some(kind) = event.resource_kind() {
        envelope.add_header(RESOURCE_KIND_HEADER, kind);
    }
    Ok(envelope)
}
