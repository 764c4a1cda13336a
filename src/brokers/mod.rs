//! # Brokers: where relayed events go.
//!
//! This module provides the [`Broker`] trait and the built-in backends.
//!
//! ## Architecture
//! ```text
//! Relay::publish(event)
//!     │
//!     ├──► broker.build_envelope(&event) ──► Envelope
//!     │
//!     └──► broker.send_message(envelope)
//!                 │
//!            ┌────┴──────────────┐
//!            ▼                   ▼
//!      StdoutBroker        TopicBroker<T: Transport>
//!      (log output)              │
//!                          ┌─────┴─────┐
//!                          ▼           ▼
//!                       Pub/Sub      Kafka   (SDK adapters, external)
//! ```
//!
//! ## Broker types
//! - [`StdoutBroker`]: debug sink, logs encoded envelopes.
//! - [`TopicBroker`]: routes each event kind to a topic and delegates the wire
//!   work to a [`Transport`].
//!
//! [`build_broker`] picks one from a [`BrokerConfig`](crate::BrokerConfig).

mod broker;
mod factory;
mod stdout;
mod topic;

pub use broker::{base_envelope, Broker};
pub use factory::build_broker;
pub use stdout::StdoutBroker;
pub use topic::{TopicBroker, Transport, TransportError};
