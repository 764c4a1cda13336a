//! # Watch framework seam.
//!
//! [`Manager`] is the handle to the framework that observes cluster state and
//! calls an [`EventHandler`] for every change. [`Connector`] creates a manager
//! from the relay configuration (kubeconfig, client setup and so on live in
//! the implementation).

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::error::WatchError;
use crate::watch::{EventHandler, ResourceKind, Watcher};

/// Handle to a resource-watch framework.
#[async_trait]
pub trait Manager: Send + Sync + 'static {
    /// Binds `handler` to changes of `kind`.
    ///
    /// Every call creates an independent watcher, even for a kind that is already watched.
    fn register(
        &self,
        kind: &ResourceKind,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Watcher, WatchError>;

    /// Runs the event loop until `token` is cancelled (`Ok`) or the framework
    /// fails (`Err`). In-flight callbacks finish before this returns.
    async fn start(&self, token: CancellationToken) -> Result<(), WatchError>;
}

/// Creates a [`Manager`] from connection parameters.
pub trait Connector {
    fn connect(&self, cfg: &RelayConfig) -> Result<Arc<dyn Manager>, WatchError>;
}

impl<F> Connector for F
where
    F: Fn(&RelayConfig) -> Result<Arc<dyn Manager>, WatchError>,
{
    fn connect(&self, cfg: &RelayConfig) -> Result<Arc<dyn Manager>, WatchError> {
        self(cfg)
    }
}
