//! Broker selection, resolved once at startup.

use std::sync::Arc;

use tracing::info;

use crate::brokers::{Broker, StdoutBroker, TopicBroker, Transport};
use crate::config::BrokerConfig;
use crate::error::RelayError;

/// Creates the broker described by `cfg`.
///
/// External backends publish through `transport` (the SDK adapter for that
/// backend); the debug sink ignores it. A missing transport for an external
/// backend is a configuration error.
pub fn build_broker(
    cfg: &BrokerConfig,
    transport: Option<Arc<dyn Transport>>,
) -> Result<Arc<dyn Broker>, RelayError> {
    let (topics, timeout) = match cfg {
        BrokerConfig::Stdout => {
            info!(broker = "stdout", "using debug broker");
            return Ok(Arc::new(StdoutBroker::new()));
        }
        BrokerConfig::PubSub(pubsub) => {
            if pubsub.project_id.trim().is_empty() {
                return Err(RelayError::Config {
                    violations: vec!["pubsub broker requires a project id".to_string()],
                });
            }
            (pubsub.topics.clone(), pubsub.publish_timeout)
        }
        BrokerConfig::Kafka(kafka) => {
            if kafka.bootstrap_servers.trim().is_empty() {
                return Err(RelayError::Config {
                    violations: vec!["kafka broker requires bootstrap servers".to_string()],
                });
            }
            (kafka.topics.clone(), kafka.publish_timeout)
        }
    };

    let transport = transport.ok_or_else(|| RelayError::Config {
        violations: vec![format!("{} broker requires a transport", cfg.kind())],
    })?;

    info!(broker = %cfg.kind(), transport = transport.name(), "using topic broker");
    Ok(Arc::new(TopicBroker::new(transport, topics, timeout)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brokers::TransportError;
    use crate::config::{KafkaConfig, PubSubConfig, TopicMap, DEFAULT_PUBLISH_TIMEOUT};
    use async_trait::async_trait;

    struct Null;

    #[async_trait]
    impl Transport for Null {
        async fn publish(&self, _topic: &str, _payload: Vec<u8>) -> Result<(), TransportError> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "null"
        }
    }

    fn pubsub() -> BrokerConfig {
        BrokerConfig::PubSub(PubSubConfig {
            project_id: "arena-prod".into(),
            credentials_file: None,
            topics: TopicMap::default(),
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        })
    }

    #[test]
    fn stdout_needs_no_transport() {
        let broker = build_broker(&BrokerConfig::Stdout, None).unwrap();
        assert_eq!(broker.name(), "stdout");
    }

    #[test]
    fn external_backend_uses_transport() {
        let broker = build_broker(&pubsub(), Some(Arc::new(Null))).unwrap();
        assert_eq!(broker.name(), "null");
    }

    #[test]
    fn external_backend_without_transport_is_rejected() {
        let err = build_broker(&pubsub(), None).err().unwrap();
        assert!(err.to_string().contains("pubsub broker requires a transport"));
    }

    #[test]
    fn kafka_requires_bootstrap_servers() {
        let cfg = BrokerConfig::Kafka(KafkaConfig {
            bootstrap_servers: " ".into(),
            api_key: None,
            api_secret: None,
            topics: TopicMap::default(),
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        });
        let err = build_broker(&cfg, Some(Arc::new(Null))).err().unwrap();
        assert_eq!(err.as_label(), "relay_config");
    }
}
