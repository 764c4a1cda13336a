//! # Relay configuration.
//!
//! Provides [`RelayConfig`] (settings of the broadcaster and its watch framework)
//! and [`BrokerConfig`] (which backend to publish to, with one struct per backend).
//!
//! Configuration is resolved once at startup and passed by value into
//! constructors. [`BrokerConfig::from_env`] is the only place that reads process
//! environment; nothing reads it afterwards.
//!
//! ## Sentinel values
//! - `max_concurrent = 0` → unlimited (no global semaphore created)
//! - `sync_period = 0s` → no periodic resync
//! - `publish_timeout = 0s` → no publish timeout

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::RelayError;
use crate::events::EventKind;

/// Global configuration for the broadcaster.
///
/// ## Field semantics
/// - `sync_period`: how often watched objects are re-delivered as updates (`0s` = never)
/// - `max_concurrent`: in-flight callback limit across all watchers (`0` = unlimited)
/// - `queue_capacity`: per-watcher change queue size (min 1)
/// - `broker`: backend the builder resolves when none is set explicitly (`None` = no broker)
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Minimum frequency at which watched resources are reconciled again.
    pub sync_period: Duration,

    /// Maximum number of callbacks running at the same time.
    pub max_concurrent: usize,

    /// Capacity of each watcher's change queue.
    pub queue_capacity: usize,

    /// Broker backend settings, resolved through [`build_broker`](crate::build_broker)
    /// at build time. `None` runs without a broker: events are logged and dropped.
    pub broker: Option<BrokerConfig>,
}

impl RelayConfig {
    /// Returns the global concurrency limit as an `Option`.
    #[inline]
    pub fn concurrency_limit(&self) -> Option<usize> {
        if self.max_concurrent == 0 {
            None
        } else {
            Some(self.max_concurrent)
        }
    }

    /// Returns the resync period as an `Option` (`None` disables resync).
    #[inline]
    pub fn resync_period(&self) -> Option<Duration> {
        if self.sync_period == Duration::ZERO {
            None
        } else {
            Some(self.sync_period)
        }
    }

    /// Returns a queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn queue_capacity_clamped(&self) -> usize {
        self.queue_capacity.max(1)
    }
}

impl Default for RelayConfig {
    /// Default configuration:
    ///
    /// - `sync_period = 15s`
    /// - `max_concurrent = 5`
    /// - `queue_capacity = 1024`
    /// - `broker = None`
    fn default() -> Self {
        Self {
            sync_period: Duration::from_secs(15),
            max_concurrent: 5,
            queue_capacity: 1024,
            broker: None,
        }
    }
}

/// Broker selection token as given on the command line or in a config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerKind {
    /// Debug sink that logs every envelope.
    Stdout,
    /// Google Cloud Pub/Sub.
    PubSub,
    /// Apache Kafka.
    Kafka,
}

impl BrokerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrokerKind::Stdout => "stdout",
            BrokerKind::PubSub => "pubsub",
            BrokerKind::Kafka => "kafka",
        }
    }
}

impl fmt::Display for BrokerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrokerKind {
    type Err = RelayError;

    /// Parses a broker token. An empty token selects the debug sink.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "stdout" | "debug" => Ok(BrokerKind::Stdout),
            "pubsub" => Ok(BrokerKind::PubSub),
            "kafka" => Ok(BrokerKind::Kafka),
            other => Err(RelayError::Config {
                violations: vec![format!("unknown broker type {other:?}")],
            }),
        }
    }
}

/// Destination topic for every event kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicMap {
    pub added: String,
    pub updated: String,
    pub deleted: String,
}

impl TopicMap {
    /// Returns the topic configured for `kind`, or `None` when it is blank.
    pub fn topic_for(&self, kind: EventKind) -> Option<&str> {
        let topic = match kind {
            EventKind::Added => &self.added,
            EventKind::Updated => &self.updated,
            EventKind::Deleted => &self.deleted,
        };
        if topic.trim().is_empty() {
            None
        } else {
            Some(topic.as_str())
        }
    }
}

impl Default for TopicMap {
    /// `agones.events.added`, `agones.events.updated`, `agones.events.deleted`.
    fn default() -> Self {
        Self {
            added: "agones.events.added".into(),
            updated: "agones.events.updated".into(),
            deleted: "agones.events.deleted".into(),
        }
    }
}

/// Settings of the Pub/Sub backend.
#[derive(Clone, Debug, PartialEq)]
pub struct PubSubConfig {
    /// Cloud project that owns the topics.
    pub project_id: String,
    /// Service-account key file. `None` uses the ambient workload identity.
    pub credentials_file: Option<PathBuf>,
    pub topics: TopicMap,
    pub publish_timeout: Duration,
}

/// Settings of the Kafka backend.
#[derive(Clone, PartialEq)]
pub struct KafkaConfig {
    /// Comma-separated `host:port` list.
    pub bootstrap_servers: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub topics: TopicMap,
    pub publish_timeout: Duration,
}

impl fmt::Debug for KafkaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KafkaConfig")
            .field("bootstrap_servers", &self.bootstrap_servers)
            .field("api_key", &self.api_key)
            .field("api_secret", &self.api_secret.as_ref().map(|_| "<redacted>"))
            .field("topics", &self.topics)
            .field("publish_timeout", &self.publish_timeout)
            .finish()
    }
}

/// Default publish timeout for external backends.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Backend selection with its settings.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum BrokerConfig {
    #[default]
    Stdout,
    PubSub(PubSubConfig),
    Kafka(KafkaConfig),
}

impl BrokerConfig {
    pub fn kind(&self) -> BrokerKind {
        match self {
            BrokerConfig::Stdout => BrokerKind::Stdout,
            BrokerConfig::PubSub(_) => BrokerKind::PubSub,
            BrokerConfig::Kafka(_) => BrokerKind::Kafka,
        }
    }

    /// Reads backend settings for `kind` from the process environment.
    ///
    /// | Backend | Variables |
    /// |---------|-----------|
    /// | pubsub  | `PUBSUB_PROJECT_ID` (required), `PUBSUB_CREDENTIALS` |
    /// | kafka   | `KAFKA_SERVERS` (required), `KAFKA_APIKEY`, `KAFKA_APISECRET` |
    ///
    /// Missing required variables are reported together.
    pub fn from_env(kind: BrokerKind) -> Result<Self, RelayError> {
        let mut violations = Vec::new();
        let mut required = |name: &str| match non_empty_var(name) {
            Some(v) => v,
            None => {
                violations.push(format!("{name} must be set for the {kind} broker"));
                String::new()
            }
        };

        let cfg = match kind {
            BrokerKind::Stdout => BrokerConfig::Stdout,
            BrokerKind::PubSub => BrokerConfig::PubSub(PubSubConfig {
                project_id: required("PUBSUB_PROJECT_ID"),
                credentials_file: non_empty_var("PUBSUB_CREDENTIALS").map(PathBuf::from),
                topics: TopicMap::default(),
                publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
            }),
            BrokerKind::Kafka => BrokerConfig::Kafka(KafkaConfig {
                bootstrap_servers: required("KAFKA_SERVERS"),
                api_key: non_empty_var("KAFKA_APIKEY"),
                api_secret: non_empty_var("KAFKA_APISECRET"),
                topics: TopicMap::default(),
                publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
            }),
        };

        if violations.is_empty() {
            Ok(cfg)
        } else {
            Err(RelayError::Config { violations })
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
