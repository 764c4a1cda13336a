//! # Watch callback contract.
//!
//! The watch framework reports every observed change of a registered resource
//! kind through an [`EventHandler`]. The broadcaster's [`Relay`](crate::Relay)
//! is the handler in production; tests plug in their own.
//!
//! ## Rules
//! - Callbacks may run concurrently for different kinds and, depending on the
//!   framework, overlap for the same kind.
//! - A returned error is logged by the framework and never stops the watch loop.

use std::borrow::Cow;
use std::fmt;

use async_trait::async_trait;

use crate::error::PublishError;
use crate::events::Snapshot;

/// Receiver of resource changes.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// A resource appeared.
    async fn on_add(&self, resource: Snapshot) -> Result<(), PublishError>;

    /// A resource changed from `old` to `new`.
    async fn on_update(&self, old: Snapshot, new: Snapshot) -> Result<(), PublishError>;

    /// A resource disappeared; `resource` is its last known state.
    async fn on_delete(&self, resource: Snapshot) -> Result<(), PublishError>;
}

/// Category of watched cluster object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKind(Cow<'static, str>);

impl ResourceKind {
    /// Game-server fleets.
    pub const FLEET: ResourceKind = ResourceKind(Cow::Borrowed("Fleet"));
    /// Individual game-server (worker) instances.
    pub const GAME_SERVER: ResourceKind = ResourceKind(Cow::Borrowed("GameServer"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ResourceKind {
    fn from(name: &'static str) -> Self {
        Self::new(name)
    }
}

/// Handle to one watcher registered with a watch framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watcher {
    id: u64,
    kind: ResourceKind,
}

impl Watcher {
    pub fn new(id: u64, kind: ResourceKind) -> Self {
        Self { id, kind }
    }

    /// Framework-assigned identifier, unique per manager.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }
}

impl fmt::Display for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}
