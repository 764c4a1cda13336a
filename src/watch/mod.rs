//! Watcher registration against a resource-watch framework.
//!
//! ## Contents
//! - [`EventHandler`]: callback contract the framework invokes (`on_add`, `on_update`, `on_delete`)
//! - [`Manager`], [`Connector`]: seam to the framework that observes the cluster
//! - [`ResourceKind`], [`Watcher`]: what is watched and the registration handle
//! - [`ChannelManager`], [`WatchFeed`], [`Change`]: in-process framework fed through channels
//!
//! ```text
//! BroadcasterBuilder::with_watcher_for(kind) ──► Manager::register(kind, relay) ──► Watcher
//! Broadcaster::start(token) ──► Manager::start(token) ──► relay.on_add/on_update/on_delete
//! ```

mod channel;
mod handler;
mod manager;

pub use channel::{Change, ChannelManager, WatchFeed};
pub use handler::{EventHandler, ResourceKind, Watcher};
pub use manager::{Connector, Manager};
