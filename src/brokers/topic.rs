//! # Topic-routed broker over an external transport.
//!
//! [`TopicBroker`] implements the [`Broker`] contract for publish/subscribe
//! systems (Pub/Sub, Kafka, ...). The wire client itself is delegated to a
//! [`Transport`]: the SDK adapter only has to push bytes to a named topic.
//!
//! ## Flow
//! ```text
//! build_envelope(event)
//!   ├─► base headers (event_type, resource_kind)
//!   ├─► topics.topic_for(kind) ──► None → EnvelopeBuild error
//!   └─► "topic" header
//!
//! send_message(envelope)
//!   ├─► read "topic" header ──► None → EnvelopeBuild error
//!   ├─► envelope.encode()
//!   └─► transport.publish(topic, bytes) under publish_timeout
//!          ├─ Ok             → Ok
//!          ├─ Err(e)         → Delivery
//!          └─ timeout hit    → Timeout
//! ```
//!
//! ## Rules
//! - One attempt per envelope; retry policy belongs to the transport.
//! - `publish_timeout = 0s` disables the timeout.
//! - The transport is shared by all watchers and must be safe for concurrent use.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time;

use crate::brokers::{base_envelope, Broker};
use crate::config::TopicMap;
use crate::error::PublishError;
use crate::events::{Envelope, Event, TOPIC_HEADER};

/// Boxed error returned by transports.
pub type TransportError = Box<dyn StdError + Send + Sync>;

/// Connection to an external publish/subscribe system.
///
/// Implementations own their connection lifecycle and credentials.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Publishes one encoded envelope to `topic`.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Backend name used in logs and errors (e.g. "pubsub", "kafka").
    fn name(&self) -> &'static str;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        (**self).publish(topic, payload).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Broker that routes each event kind to its own topic.
pub struct TopicBroker<T> {
    transport: T,
    topics: TopicMap,
    publish_timeout: Option<Duration>,
}

impl<T: Transport> TopicBroker<T> {
    /// Creates a broker publishing through `transport`.
    ///
    /// A zero `publish_timeout` disables the timeout.
    pub fn new(transport: T, topics: TopicMap, publish_timeout: Duration) -> Self {
        Self {
            transport,
            topics,
            publish_timeout: Some(publish_timeout).filter(|d| *d > Duration::ZERO),
        }
    }

    pub fn topics(&self) -> &TopicMap {
        &self.topics
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        let backend = self.transport.name();
        let res = match self.publish_timeout {
            Some(timeout) => time::timeout(timeout, self.transport.publish(topic, payload))
                .await
                .map_err(|_elapsed| PublishError::Timeout { backend, timeout })?,
            None => self.transport.publish(topic, payload).await,
        };

        res.map_err(|e| PublishError::Delivery {
            backend,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl<T: Transport> Broker for TopicBroker<T> {
    fn build_envelope(&self, event: &Event) -> Result<Envelope, PublishError> {
        let topic = self
            .topics
            .topic_for(event.kind())
            .ok_or_else(|| PublishError::EnvelopeBuild {
                reason: format!("no topic configured for {} events", event.event_type()),
            })?;

        let mut envelope = base_envelope(event)?;
        envelope.add_header(TOPIC_HEADER, topic);
        Ok(envelope)
    }

    async fn send_message(&self, envelope: Envelope) -> Result<(), PublishError> {
        let topic = envelope
            .header(TOPIC_HEADER)
            .ok_or_else(|| PublishError::EnvelopeBuild {
                reason: format!("envelope for {} has no topic header", self.transport.name()),
            })?
            .to_owned();

        let payload = envelope.encode()?;
        self.publish(&topic, payload).await
    }

    fn name(&self) -> &'static str {
        self.transport.name()
    }
}
