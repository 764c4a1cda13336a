//! Runtime core: wiring and lifecycle.
//!
//! The public entry points are [`Broadcaster`] and [`BroadcasterBuilder`].
//!
//! Internal modules:
//! - [`broadcaster`]: drives the watch manager and tracks the lifecycle state;
//! - [`builder`]: validates the wiring and registers watchers;
//! - [`relay`]: turns watch callbacks into published events;
//! - [`shutdown`]: cross-platform termination signal handling.

mod broadcaster;
mod builder;
mod relay;
mod shutdown;

pub use broadcaster::{Broadcaster, State};
pub use builder::BroadcasterBuilder;
pub use relay::Relay;
pub use shutdown::{wait_for_shutdown_signal, ShutdownSignal};
