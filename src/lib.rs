//! # fleetcast
//!
//! **fleetcast** relays lifecycle events of game-server fleets and their
//! worker instances to a message broker.
//!
//! A watch framework observes the cluster and calls back on every add,
//! update and delete. The broadcaster turns each callback into an [`Event`],
//! lets the configured [`Broker`] wrap it into an [`Envelope`] and sends it.
//! Brokers are pluggable: a stdout sink for debugging and a topic-routing
//! broker over an arbitrary [`Transport`] (Pub/Sub, Kafka adapters).
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐          ┌──────────────┐
//!     │ Watcher      │          │ Watcher      │
//!     │ (Fleet)      │          │ (GameServer) │
//!     └──────┬───────┘          └──────┬───────┘
//!            ▼                         ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Manager (watch framework)                                        │
//! │  - per-watcher queues and workers                                 │
//! │  - max_concurrent callbacks in flight                             │
//! │  - periodic resync of cached objects                              │
//! └──────────────────────────────┬────────────────────────────────────┘
//!                                ▼
//!                  on_add / on_update / on_delete
//!                                ▼
//!                    ┌────────────────────────┐
//!                    │ Relay (EventHandler)   │
//!                    │ Event::on_added(...)   │
//!                    └───────────┬────────────┘
//!                                ▼
//!                    broker.build_envelope(&event)
//!                                ▼
//!                    broker.send_message(envelope)
//!                     ┌──────────┴──────────┐
//!                     ▼                     ▼
//!               StdoutBroker        TopicBroker<Transport>
//! ```
//!
//! ### Lifecycle
//! ```text
//! BroadcasterBuilder ──► build() ──► Broadcaster [Ready]
//!                                        │
//!                                  start(token) / run()
//!                                        │
//!                                    [Running] ──► Manager::start(token)
//!                                        │
//!                 ├─ token cancelled (OS signal in run()) ─► [Stopped]
//!                 └─ fatal watch error                    ─► [Failed]
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                         |
//! |-------------------|--------------------------------------------------------------|--------------------------------------------|
//! | **Events**        | Typed lifecycle events and the wire envelope.                | [`Event`], [`EventKind`], [`Envelope`]     |
//! | **Brokers**       | Pluggable publishing backends.                               | [`Broker`], [`StdoutBroker`], [`TopicBroker`] |
//! | **Watching**      | Seam to the resource-watch framework.                        | [`Manager`], [`EventHandler`], [`ChannelManager`] |
//! | **Broadcasting**  | Wiring, validation and lifecycle.                            | [`Broadcaster`], [`BroadcasterBuilder`]    |
//! | **Errors**        | Typed errors for configuration, publishing and watching.     | [`RelayError`], [`PublishError`]           |
//! | **Configuration** | Runtime settings and broker selection.                       | [`RelayConfig`], [`BrokerConfig`]          |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//! use fleetcast::{
//!     build_broker, BrokerConfig, Broadcaster, ChannelManager, RelayConfig, ResourceKind, Snapshot,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = RelayConfig::default();
//!     let manager = Arc::new(ChannelManager::new(&cfg));
//!     let broker = build_broker(&BrokerConfig::Stdout, None)?;
//!
//!     let bc = Broadcaster::builder(cfg)
//!         .with_manager(manager.clone())
//!         .with_broker(broker)
//!         .with_watcher_for(ResourceKind::FLEET)
//!         .build()?;
//!
//!     // Feed one change the way a cluster watch would.
//!     let feed = manager.feeds(&ResourceKind::FLEET).remove(0);
//!     let fleet = Snapshot::new(json!({"kind": "Fleet", "metadata": {"name": "arena"}}))?;
//!     feed.added(fleet).await?;
//!
//!     let token = CancellationToken::new();
//!     let stop = token.clone();
//!     tokio::spawn(async move {
//!         tokio::time::sleep(std::time::Duration::from_millis(50)).await;
//!         stop.cancel();
//!     });
//!     bc.start(token).await?;
//!     Ok(())
//! }
//! ```

pub mod brokers;
mod config;
mod core;
mod error;
mod events;
mod watch;

// ---- Public re-exports ----

pub use brokers::{build_broker, Broker, StdoutBroker, TopicBroker, Transport, TransportError};
pub use config::{
    BrokerConfig, BrokerKind, KafkaConfig, PubSubConfig, RelayConfig, TopicMap,
    DEFAULT_PUBLISH_TIMEOUT,
};
pub use core::{
    wait_for_shutdown_signal, Broadcaster, BroadcasterBuilder, Relay, ShutdownSignal, State,
};
pub use error::{EncodeError, EventError, PublishError, RelayError, WatchError};
pub use events::{
    Envelope, Event, EventKind, Header, Payload, Snapshot, EVENT_TYPE_HEADER,
    RESOURCE_KIND_HEADER, TOPIC_HEADER,
};
pub use watch::{
    Change, ChannelManager, Connector, EventHandler, Manager, ResourceKind, WatchFeed, Watcher,
};
