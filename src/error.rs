//! Error types used by the relay core, brokers and the watch framework seam.
//!
//! - [`RelayError`]: startup and lifecycle errors of the broadcaster (fatal).
//! - [`PublishError`]: per-event failures while building or sending an envelope.
//! - [`WatchError`]: failures reported by the watch framework.
//! - [`EventError`]: a resource snapshot could not be captured.
//! - [`EncodeError`]: an envelope could not be serialized or parsed.
//!
//! Every enum provides `as_label` (stable snake_case string for logs).

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the broadcaster lifecycle.
///
/// All of these are fatal for startup: the process is expected to log them
/// and exit with a non-zero status.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RelayError {
    /// `build()` found one or more invalid settings. All violations are collected.
    #[error("broadcaster is misconfigured: {}", violations.join("; "))]
    Config {
        /// Every violation found, in detection order.
        violations: Vec<String>,
    },

    /// The watch framework handle could not be created.
    #[error("error creating watch manager: {0}")]
    Connect(#[source] WatchError),

    /// The watch framework stopped with a fatal error while running.
    #[error("broadcaster could not run: {0}")]
    Watch(#[from] WatchError),

    /// `start()` was called on a broadcaster that already left the ready state.
    #[error("broadcaster already started")]
    AlreadyStarted,
}

impl RelayError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use fleetcast::RelayError;
    ///
    /// let err = RelayError::Config { violations: vec!["no watchers".into()] };
    /// assert_eq!(err.as_label(), "relay_config");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RelayError::Config { .. } => "relay_config",
            RelayError::Connect(_) => "relay_connect",
            RelayError::Watch(_) => "relay_watch",
            RelayError::AlreadyStarted => "relay_already_started",
        }
    }
}

/// # Errors produced while publishing a single event.
///
/// These never escape the publish attempt of the event that caused them.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PublishError {
    /// The broker could not derive an envelope from the event.
    #[error("error building envelope: {reason}")]
    EnvelopeBuild {
        /// What could not be extracted or routed.
        reason: String,
    },

    /// The envelope could not be serialized.
    #[error(transparent)]
    Encoding(#[from] EncodeError),

    /// The backend rejected or failed to transmit the envelope.
    #[error("{backend}: delivery failed: {reason}")]
    Delivery {
        /// Broker backend name.
        backend: &'static str,
        /// Transport error message.
        reason: String,
    },

    /// The backend did not acknowledge the envelope in time.
    #[error("{backend}: publish timed out after {timeout:?}")]
    Timeout {
        /// Broker backend name.
        backend: &'static str,
        /// The configured publish timeout.
        timeout: Duration,
    },
}

impl PublishError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            PublishError::EnvelopeBuild { .. } => "publish_envelope_build",
            PublishError::Encoding(_) => "publish_encoding",
            PublishError::Delivery { .. } => "publish_delivery",
            PublishError::Timeout { .. } => "publish_timeout",
        }
    }

    /// Indicates whether a backend may reasonably retry the event.
    ///
    /// The relay itself never retries; this only classifies the failure.
    ///
    /// # Example
    /// ```
    /// use fleetcast::PublishError;
    ///
    /// let transient = PublishError::Delivery { backend: "kafka", reason: "broker down".into() };
    /// assert!(transient.is_retryable());
    ///
    /// let permanent = PublishError::EnvelopeBuild { reason: "no topic".into() };
    /// assert!(!permanent.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PublishError::Delivery { .. } | PublishError::Timeout { .. }
        )
    }
}

/// Envelope (de)serialization failure.
#[derive(Error, Debug)]
#[error("error encoding envelope: {0}")]
pub struct EncodeError(#[from] pub serde_json::Error);

/// # Errors reported by the watch framework.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WatchError {
    /// A watcher could not be registered for a resource kind.
    #[error("error registering watcher for {kind}: {reason}")]
    Register {
        /// Resource kind that was being registered.
        kind: String,
        /// Underlying reason.
        reason: String,
    },

    /// The framework event loop was started twice.
    #[error("watch manager is already running")]
    AlreadyRunning,

    /// Non-recoverable framework failure.
    #[error("watch manager failed: {reason}")]
    Fatal {
        /// Underlying reason.
        reason: String,
    },

    /// A change was pushed to a watcher whose framework has shut down.
    #[error("watch feed for {kind} is closed")]
    Closed {
        /// Resource kind of the closed feed.
        kind: String,
    },
}

impl WatchError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            WatchError::Register { .. } => "watch_register",
            WatchError::AlreadyRunning => "watch_already_running",
            WatchError::Fatal { .. } => "watch_fatal",
            WatchError::Closed { .. } => "watch_closed",
        }
    }
}

/// # Errors raised when capturing a resource snapshot.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum EventError {
    /// The resource serialized to `null` or an empty object.
    #[error("event payload is empty")]
    EmptyPayload,

    /// The resource could not be serialized.
    #[error("error capturing resource: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl EventError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventError::EmptyPayload => "event_empty_payload",
            EventError::Serialize(_) => "event_serialize",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_lists_every_violation() {
        let err = RelayError::Config {
            violations: vec!["first".into(), "second".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("first"));
        assert!(msg.contains("second"));
    }

    #[test]
    fn timeout_is_retryable_but_encoding_is_not() {
        let timeout = PublishError::Timeout {
            backend: "pubsub",
            timeout: Duration::from_secs(1),
        };
        assert!(timeout.is_retryable());
        assert_eq!(timeout.as_label(), "publish_timeout");

        let bad = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let encoding = PublishError::from(EncodeError(bad));
        assert!(!encoding.is_retryable());
        assert_eq!(encoding.as_label(), "publish_encoding");
    }

    #[test]
    fn watch_error_converts_into_relay_error() {
        let err: RelayError = WatchError::Fatal {
            reason: "lost api server".into(),
        }
        .into();
        assert_eq!(err.as_label(), "relay_watch");
        assert!(err.to_string().contains("lost api server"));
    }
}
