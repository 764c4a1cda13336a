use std::sync::Arc;

use tracing::{error, warn};

use crate::brokers::{build_broker, Broker, Transport};
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::watch::{Connector, Manager, ResourceKind, Watcher};

use super::{broadcaster::Broadcaster, relay::Relay};

/// Builder for constructing a [`Broadcaster`].
///
/// Collects the watch manager, the broker and the watched resource kinds;
/// [`build`](Self::build) validates them together.
pub struct BroadcasterBuilder {
    cfg: RelayConfig,
    manager: Option<Arc<dyn Manager>>,
    broker: Option<Arc<dyn Broker>>,
    transport: Option<Arc<dyn Transport>>,
    kinds: Vec<ResourceKind>,
}

impl BroadcasterBuilder {
    /// Creates an empty builder with the given configuration.
    pub fn new(cfg: RelayConfig) -> Self {
        Self {
            cfg,
            manager: None,
            broker: None,
            transport: None,
            kinds: Vec::new(),
        }
    }

    /// Creates the watch manager through `connector` and a builder around it.
    ///
    /// Fails immediately when the manager cannot be created.
    pub fn connect<C: Connector + ?Sized>(
        connector: &C,
        broker: Option<Arc<dyn Broker>>,
        cfg: RelayConfig,
    ) -> Result<Self, RelayError> {
        let manager = connector.connect(&cfg).map_err(|e| {
            error!(error = %e, "error creating watch manager");
            RelayError::Connect(e)
        })?;

        let mut builder = Self::new(cfg).with_manager(manager);
        builder.broker = broker;
        Ok(builder)
    }

    /// Sets the watch framework handle.
    pub fn with_manager(mut self, manager: Arc<dyn Manager>) -> Self {
        self.manager = Some(manager);
        self
    }

    /// Sets the broker events are published to.
    ///
    /// Takes precedence over `cfg.broker`. Without any broker the broadcaster
    /// still runs; events are logged and dropped.
    pub fn with_broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Sets the transport used when the broker is resolved from `cfg.broker`.
    ///
    /// Ignored when a broker is set with [`with_broker`](Self::with_broker).
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Adds a watcher for `kind`.
    ///
    /// Every call adds an independent watcher, also for a kind that is already watched.
    pub fn with_watcher_for(mut self, kind: impl Into<ResourceKind>) -> Self {
        self.kinds.push(kind.into());
        self
    }

    /// Validates the configuration, resolves the broker, registers the watchers
    /// and returns the broadcaster.
    ///
    /// Every violation is collected into a single [`RelayError::Config`]:
    /// - no watch manager
    /// - no watchers
    /// - `cfg.broker` cannot be turned into a broker
    /// - watchers the manager refused to register
    ///
    /// Registration only starts once the other checks pass. A registration
    /// failure still leaves the watchers registered before it in the manager.
    pub fn build(self) -> Result<Arc<Broadcaster>, RelayError> {
        let mut violations = Vec::new();

        if self.manager.is_none() {
            violations.push("broadcaster requires a watch manager to operate".to_string());
        }
        if self.kinds.is_empty() {
            violations.push(
                "can't build a broadcaster without watchers, use with_watcher_for to add one"
                    .to_string(),
            );
        }

        let broker = match (self.broker, &self.cfg.broker) {
            (Some(broker), _) => Some(broker),
            (None, Some(broker_cfg)) => match build_broker(broker_cfg, self.transport) {
                Ok(broker) => Some(broker),
                Err(RelayError::Config { violations: found }) => {
                    violations.extend(found);
                    None
                }
                Err(e) => {
                    violations.push(e.to_string());
                    None
                }
            },
            (None, None) => None,
        };

        let manager = match self.manager {
            Some(manager) if violations.is_empty() => manager,
            _ => return Err(RelayError::Config { violations }),
        };

        if broker.is_none() {
            warn!("no broker configured, events will not be published");
        }
        let relay = Arc::new(Relay::new(broker));

        let watchers: Vec<Watcher> = self
            .kinds
            .iter()
            .filter_map(|kind| match manager.register(kind, relay.clone()) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    violations.push(e.to_string());
                    None
                }
            })
            .collect();

        if !violations.is_empty() {
            return Err(RelayError::Config { violations });
        }

        Ok(Arc::new(Broadcaster::new_internal(
            self.cfg, manager, watchers, relay,
        )))
    }
}
