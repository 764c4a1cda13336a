//! # StdoutBroker: debug sink
//!
//! A minimal broker that encodes every envelope and writes it to the log.
//! Use it for local runs and debugging; it never fails transport.
//!
//! ## Example output
//! ```text
//! {"level":"INFO","fields":{"message":"{\"header\":{\"headers\":{\"event_type\":\"added\",\"resource_kind\":\"Fleet\"}},\"message\":{...}}"},"target":"fleetcast::brokers::stdout"}
//! ```

use async_trait::async_trait;
use tracing::info;

use crate::brokers::{base_envelope, Broker};
use crate::error::PublishError;
use crate::events::{Envelope, Event, EVENT_TYPE_HEADER};

/// Envelope printer broker.
#[derive(Debug, Default)]
pub struct StdoutBroker;

impl StdoutBroker {
    /// Construct a new [`StdoutBroker`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Broker for StdoutBroker {
    fn build_envelope(&self, event: &Event) -> Result<Envelope, PublishError> {
        base_envelope(event)
    }

    async fn send_message(&self, envelope: Envelope) -> Result<(), PublishError> {
        let output = envelope.encode()?;
        info!(
            event_type = envelope.header(EVENT_TYPE_HEADER).unwrap_or_default(),
            "{}",
            String::from_utf8_lossy(&output)
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}
