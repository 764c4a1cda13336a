//! # Broadcaster: owns the watch manager, the watchers and the relay.
//!
//! The [`Broadcaster`] is created by [`BroadcasterBuilder`](super::BroadcasterBuilder)
//! once the manager and at least one watcher are in place. It drives the watch
//! manager's event loop; the manager calls the [`Relay`] for every change.
//!
//! ## Lifecycle
//! ```text
//! BroadcasterBuilder (building)
//!     └─► build() ──► Broadcaster [Ready]
//!                        └─► start(token) ──► [Running]
//!                                 ├─ token cancelled      ──► [Stopped]  Ok(())
//!                                 └─ manager fatal error  ──► [Failed]   Err(RelayError::Watch)
//!
//! run():
//!   shutdown::wait_for_shutdown_signal() ─► token.cancel() ─► start() returns
//! ```
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use fleetcast::{Broadcaster, ChannelManager, RelayConfig, ResourceKind, State, StdoutBroker};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = RelayConfig::default();
//!     let manager = Arc::new(ChannelManager::new(&cfg));
//!
//!     let bc = Broadcaster::builder(cfg)
//!         .with_manager(manager)
//!         .with_broker(Arc::new(StdoutBroker::new()))
//!         .with_watcher_for(ResourceKind::FLEET)
//!         .with_watcher_for(ResourceKind::GAME_SERVER)
//!         .build()?;
//!
//!     let token = CancellationToken::new();
//!     token.cancel();
//!     bc.start(token).await?;
//!     assert_eq!(bc.state(), State::Stopped);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::RelayConfig;
use crate::error::{PublishError, RelayError};
use crate::events::Event;
use crate::watch::{Manager, Watcher};

use super::{builder::BroadcasterBuilder, relay::Relay, shutdown};

/// Lifecycle state of a [`Broadcaster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Built and validated; `start` has not been called.
    Ready,
    /// The watch manager's event loop is running.
    Running,
    /// Stopped after cancellation.
    Stopped,
    /// Stopped after a fatal watch-framework error.
    Failed,
}

/// Relays watch callbacks of all registered watchers to the broker.
pub struct Broadcaster {
    cfg: RelayConfig,
    manager: Arc<dyn Manager>,
    watchers: Vec<Watcher>,
    relay: Arc<Relay>,
    state: watch::Sender<State>,
}

impl Broadcaster {
    /// Returns a builder for a broadcaster with the given configuration.
    pub fn builder(cfg: RelayConfig) -> BroadcasterBuilder {
        BroadcasterBuilder::new(cfg)
    }

    pub(super) fn new_internal(
        cfg: RelayConfig,
        manager: Arc<dyn Manager>,
        watchers: Vec<Watcher>,
        relay: Arc<Relay>,
    ) -> Self {
        let (state, _rx) = watch::channel(State::Ready);
        Self {
            cfg,
            manager,
            watchers,
            relay,
            state,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.cfg
    }

    /// Registered watchers, in registration order.
    pub fn watchers(&self) -> &[Watcher] {
        &self.watchers
    }

    /// The callback target bound to every watcher.
    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    pub fn state(&self) -> State {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<State> {
        self.state.subscribe()
    }

    /// Publishes an event through the relay's broker.
    pub async fn publish(&self, event: Event) -> Result<(), PublishError> {
        self.relay.publish(event).await
    }

    /// Runs the watch manager until `token` is cancelled or the manager fails.
    ///
    /// Blocks the calling task for the whole run. Can be called once.
    pub async fn start(&self, token: CancellationToken) -> Result<(), RelayError> {
        let started = self.state.send_if_modified(|state| {
            if *state == State::Ready {
                *state = State::Running;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(RelayError::AlreadyStarted);
        }

        info!(
            watchers = self.watchers.len(),
            broker = self.relay.broker().map_or("none", |b| b.name()),
            sync_period = ?self.cfg.sync_period,
            max_concurrent = self.cfg.max_concurrent,
            "starting broadcaster"
        );

        match self.manager.start(token).await {
            Ok(()) => {
                self.state.send_replace(State::Stopped);
                info!("broadcaster stopped");
                Ok(())
            }
            Err(e) => {
                self.state.send_replace(State::Failed);
                error!(error = %e, label = e.as_label(), "broadcaster could not run");
                Err(RelayError::Watch(e))
            }
        }
    }

    /// [`start`](Self::start) with a token cancelled on the first termination signal.
    pub async fn run(&self) -> Result<(), RelayError> {
        let token = CancellationToken::new();
        let start = self.start(token.clone());
        tokio::pin!(start);

        tokio::select! {
            res = &mut start => res,
            sig = shutdown::wait_for_shutdown_signal() => {
                match sig {
                    Ok(signal) => {
                        info!(signal = %signal, "shutdown requested");
                        token.cancel();
                    }
                    Err(e) => {
                        warn!(error = %e, "signal handlers unavailable, running until the watch manager stops");
                    }
                }
                start.await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brokers::{base_envelope, Broker, Transport, TransportError};
    use crate::config::{BrokerConfig, PubSubConfig, TopicMap, DEFAULT_PUBLISH_TIMEOUT};
    use crate::error::WatchError;
    use crate::events::{Envelope, Snapshot, EVENT_TYPE_HEADER, RESOURCE_KIND_HEADER};
    use crate::watch::{ChannelManager, EventHandler, ResourceKind};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::{Barrier, Mutex};

    #[derive(Default)]
    struct Capture {
        sent: Mutex<Vec<Envelope>>,
    }

    #[async_trait]
    impl Broker for Capture {
        fn build_envelope(&self, event: &Event) -> Result<Envelope, PublishError> {
            base_envelope(event)
        }

        async fn send_message(&self, envelope: Envelope) -> Result<(), PublishError> {
            self.sent.lock().await.push(envelope);
            Ok(())
        }
    }

    /// Manager that refuses every registration.
    struct Refusing;

    #[async_trait]
    impl Manager for Refusing {
        fn register(
            &self,
            kind: &ResourceKind,
            _handler: Arc<dyn EventHandler>,
        ) -> Result<Watcher, WatchError> {
            Err(WatchError::Register {
                kind: kind.to_string(),
                reason: "kind not served by the api server".into(),
            })
        }

        async fn start(&self, _token: CancellationToken) -> Result<(), WatchError> {
            Ok(())
        }
    }

    /// Counts registrations and delegates to a [`ChannelManager`].
    struct Counting {
        inner: ChannelManager,
        registered: AtomicUsize,
    }

    #[async_trait]
    impl Manager for Counting {
        fn register(
            &self,
            kind: &ResourceKind,
            handler: Arc<dyn EventHandler>,
        ) -> Result<Watcher, WatchError> {
            self.registered.fetch_add(1, Ordering::SeqCst);
            self.inner.register(kind, handler)
        }

        async fn start(&self, token: CancellationToken) -> Result<(), WatchError> {
            self.inner.start(token).await
        }
    }

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn publish(&self, _topic: &str, _payload: Vec<u8>) -> Result<(), TransportError> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "null"
        }
    }

    /// Broker whose `send_message` takes five seconds.
    #[derive(Default)]
    struct Slow {
        started: tokio::sync::Notify,
        done: AtomicBool,
    }

    #[async_trait]
    impl Broker for Slow {
        fn build_envelope(&self, event: &Event) -> Result<Envelope, PublishError> {
            base_envelope(event)
        }

        async fn send_message(&self, _envelope: Envelope) -> Result<(), PublishError> {
            self.started.notify_one();
            tokio::time::sleep(Duration::from_secs(5)).await;
            self.done.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn pubsub_cfg() -> RelayConfig {
        RelayConfig {
            broker: Some(BrokerConfig::PubSub(PubSubConfig {
                project_id: "arena-prod".into(),
                credentials_file: None,
                topics: TopicMap::default(),
                publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
            })),
            ..cfg()
        }
    }

    fn cfg() -> RelayConfig {
        RelayConfig {
            sync_period: Duration::ZERO,
            ..RelayConfig::default()
        }
    }

    fn resource(kind: &str, name: &str) -> Snapshot {
        Snapshot::new(json!({"kind": kind, "metadata": {"name": name, "namespace": "default"}}))
            .unwrap()
    }

    async fn wait_for_sent(broker: &Capture, n: usize) -> Vec<Envelope> {
        for _ in 0..400 {
            let sent = broker.sent.lock().await;
            if sent.len() >= n {
                return sent.clone();
            }
            drop(sent);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("broker did not receive {n} envelopes");
    }

    #[test]
    fn build_reports_every_violation() {
        let err = Broadcaster::builder(cfg()).build().err().unwrap();
        match err {
            RelayError::Config { violations } => {
                assert_eq!(violations.len(), 2);
                assert!(violations[0].contains("watch manager"));
                assert!(violations[1].contains("without watchers"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn build_reports_missing_watchers_only() {
        let err = Broadcaster::builder(cfg())
            .with_manager(Arc::new(ChannelManager::new(&cfg())))
            .build()
            .err()
            .unwrap();
        let msg = err.to_string();
        assert!(msg.contains("without watchers"));
        assert!(!msg.contains("watch manager to operate"));
    }

    #[test]
    fn build_collects_registration_failures() {
        let err = Broadcaster::builder(cfg())
            .with_manager(Arc::new(Refusing))
            .with_watcher_for(ResourceKind::FLEET)
            .with_watcher_for(ResourceKind::GAME_SERVER)
            .build()
            .err()
            .unwrap();
        match err {
            RelayError::Config { violations } => {
                assert_eq!(violations.len(), 2);
                assert!(violations[0].contains("Fleet"));
                assert!(violations[1].contains("GameServer"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn connect_failure_is_immediate() {
        let connector = |_cfg: &RelayConfig| -> Result<Arc<dyn Manager>, WatchError> {
            Err(WatchError::Fatal {
                reason: "invalid kubeconfig".into(),
            })
        };
        let err = BroadcasterBuilder::connect(&connector, None, cfg()).err().unwrap();
        assert!(matches!(err, RelayError::Connect(_)));
        assert!(err.to_string().contains("invalid kubeconfig"));
    }

    #[tokio::test]
    async fn connect_then_build_registers_watchers() {
        let bc = BroadcasterBuilder::connect(&ChannelManager::connector(), None, cfg())
            .unwrap()
            .with_watcher_for(ResourceKind::FLEET)
            .with_watcher_for("Fleet")
            .build()
            .unwrap();

        assert_eq!(bc.watchers().len(), 2);
        assert_ne!(bc.watchers()[0].id(), bc.watchers()[1].id());
        assert_eq!(bc.state(), State::Ready);
        assert!(bc.relay().broker().is_none());
    }

    #[tokio::test]
    async fn no_broker_callbacks_succeed() {
        let manager = Arc::new(ChannelManager::new(&cfg()));
        let bc = Broadcaster::builder(cfg())
            .with_manager(manager)
            .with_watcher_for(ResourceKind::GAME_SERVER)
            .build()
            .unwrap();

        let relay = bc.relay();
        relay.on_add(resource("GameServer", "gs-1")).await.unwrap();
        relay
            .on_update(resource("GameServer", "gs-1"), resource("GameServer", "gs-1"))
            .await
            .unwrap();
        relay.on_delete(resource("GameServer", "gs-1")).await.unwrap();
    }

    #[tokio::test]
    async fn lifecycle_ready_running_stopped() {
        let manager = Arc::new(ChannelManager::new(&cfg()));
        let bc = Broadcaster::builder(cfg())
            .with_manager(manager)
            .with_broker(Arc::new(Capture::default()))
            .with_watcher_for(ResourceKind::FLEET)
            .build()
            .unwrap();
        let mut states = bc.subscribe_state();

        let token = CancellationToken::new();
        let run = tokio::spawn({
            let bc = Arc::clone(&bc);
            let token = token.clone();
            async move { bc.start(token).await }
        });

        states.wait_for(|s| *s == State::Running).await.unwrap();
        assert!(matches!(
            bc.start(CancellationToken::new()).await,
            Err(RelayError::AlreadyStarted)
        ));

        token.cancel();
        run.await.unwrap().unwrap();
        assert_eq!(bc.state(), State::Stopped);
    }

    #[tokio::test]
    async fn fatal_watch_error_fails_broadcaster() {
        let manager = Arc::new(ChannelManager::new(&cfg()));
        let bc = Broadcaster::builder(cfg())
            .with_manager(manager.clone())
            .with_watcher_for(ResourceKind::FLEET)
            .build()
            .unwrap();

        manager.fail("watch stream closed by api server");
        let err = bc.start(CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, RelayError::Watch(WatchError::Fatal { .. })));
        assert_eq!(bc.state(), State::Failed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_kinds_do_not_mix_payloads() {
        let manager = Arc::new(ChannelManager::new(&cfg()));
        let broker = Arc::new(Capture::default());
        let bc = Broadcaster::builder(cfg())
            .with_manager(manager.clone())
            .with_broker(broker.clone())
            .with_watcher_for(ResourceKind::FLEET)
            .with_watcher_for(ResourceKind::GAME_SERVER)
            .build()
            .unwrap();

        let token = CancellationToken::new();
        let run = tokio::spawn({
            let bc = Arc::clone(&bc);
            let token = token.clone();
            async move { bc.start(token).await }
        });

        let fleets = manager.feeds(&ResourceKind::FLEET).remove(0);
        let servers = manager.feeds(&ResourceKind::GAME_SERVER).remove(0);
        let barrier = Arc::new(Barrier::new(2));

        let add = tokio::spawn({
            let barrier = Arc::clone(&barrier);
            async move {
                barrier.wait().await;
                fleets.added(resource("Fleet", "arena")).await
            }
        });
        let delete = tokio::spawn({
            let barrier = Arc::clone(&barrier);
            async move {
                barrier.wait().await;
                servers.deleted(resource("GameServer", "gs-7")).await
            }
        });
        add.await.unwrap().unwrap();
        delete.await.unwrap().unwrap();

        let mut sent = wait_for_sent(&broker, 2).await;
        sent.sort_by(|a, b| a.header(EVENT_TYPE_HEADER).cmp(&b.header(EVENT_TYPE_HEADER)));

        assert_eq!(sent[0].header(EVENT_TYPE_HEADER), Some("added"));
        assert_eq!(sent[0].header(RESOURCE_KIND_HEADER), Some("Fleet"));
        assert_eq!(sent[0].message["metadata"]["name"], "arena");

        assert_eq!(sent[1].header(EVENT_TYPE_HEADER), Some("deleted"));
        assert_eq!(sent[1].header(RESOURCE_KIND_HEADER), Some("GameServer"));
        assert_eq!(sent[1].message["metadata"]["name"], "gs-7");

        token.cancel();
        run.await.unwrap().unwrap();
    }

    #[test]
    fn broker_is_resolved_from_config() {
        let bc = Broadcaster::builder(pubsub_cfg())
            .with_manager(Arc::new(ChannelManager::new(&cfg())))
            .with_transport(Arc::new(NullTransport))
            .with_watcher_for(ResourceKind::FLEET)
            .build()
            .unwrap();

        assert!(matches!(bc.config().broker, Some(BrokerConfig::PubSub(_))));
        assert_eq!(bc.relay().broker().map(|b| b.name()), Some("null"));
    }

    #[test]
    fn explicit_broker_wins_over_config() {
        let bc = Broadcaster::builder(pubsub_cfg())
            .with_manager(Arc::new(ChannelManager::new(&cfg())))
            .with_broker(Arc::new(crate::StdoutBroker::new()))
            .with_watcher_for(ResourceKind::FLEET)
            .build()
            .unwrap();
        assert_eq!(bc.relay().broker().map(|b| b.name()), Some("stdout"));
    }

    #[test]
    fn unresolvable_config_broker_fails_before_registration() {
        let manager = Arc::new(Counting {
            inner: ChannelManager::new(&cfg()),
            registered: AtomicUsize::new(0),
        });
        let err = Broadcaster::builder(pubsub_cfg())
            .with_manager(manager.clone())
            .with_watcher_for(ResourceKind::FLEET)
            .with_watcher_for(ResourceKind::GAME_SERVER)
            .build()
            .err()
            .unwrap();

        assert!(err.to_string().contains("pubsub broker requires a transport"));
        assert_eq!(manager.registered.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_waits_for_in_flight_publish() {
        let manager = Arc::new(ChannelManager::new(&cfg()));
        let broker = Arc::new(Slow::default());
        let bc = Broadcaster::builder(cfg())
            .with_manager(manager.clone())
            .with_broker(broker.clone())
            .with_watcher_for(ResourceKind::GAME_SERVER)
            .build()
            .unwrap();

        let feed = manager.feeds(&ResourceKind::GAME_SERVER).remove(0);
        feed.added(resource("GameServer", "gs-3")).await.unwrap();

        let token = CancellationToken::new();
        let run = tokio::spawn({
            let bc = Arc::clone(&bc);
            let token = token.clone();
            async move { bc.start(token).await }
        });

        broker.started.notified().await;
        token.cancel();

        run.await.unwrap().unwrap();
        assert!(broker.done.load(Ordering::SeqCst));
        assert_eq!(bc.state(), State::Stopped);
    }
}
