//! # Relay: watch callbacks → events → broker.
//!
//! [`Relay`] is the [`EventHandler`] the broadcaster binds to every watcher.
//! Each callback wraps the change into an [`Event`] and hands it to
//! [`Relay::publish`].
//!
//! ## Flow
//! ```text
//! on_add(obj)          ──► Event::on_added(obj)          ─┐
//! on_update(old, new)  ──► Event::on_updated(old, new)   ─┼─► publish(event)
//! on_delete(obj)       ──► Event::on_deleted(obj)        ─┘      │
//!                                                                ├─► broker.build_envelope(&event)
//!                                                                └─► broker.send_message(envelope)
//! ```
//!
//! ## Rules
//! - No broker configured → `warn!`, return `Ok(())`; no event is built and nothing is sent.
//! - A failed build or send is logged and returned; there is no retry.
//! - The relay holds no per-event state, so a failure never affects later events.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::brokers::Broker;
use crate::error::PublishError;
use crate::events::{Event, EventKind, Snapshot};
use crate::watch::EventHandler;

/// Publishes watch callbacks through a broker.
#[derive(Clone, Default)]
pub struct Relay {
    broker: Option<Arc<dyn Broker>>,
}

impl Relay {
    pub fn new(broker: Option<Arc<dyn Broker>>) -> Self {
        Self { broker }
    }

    pub fn broker(&self) -> Option<&Arc<dyn Broker>> {
        self.broker.as_ref()
    }

    /// Wraps `event` into an envelope and sends it.
    pub async fn publish(&self, event: Event) -> Result<(), PublishError> {
        match self.available(event.kind()) {
            Some(broker) => publish_with(broker, event).await,
            None => Ok(()),
        }
    }

    /// The broker, or `None` after logging that `kind` will be dropped.
    fn available(&self, kind: EventKind) -> Option<&Arc<dyn Broker>> {
        if self.broker.is_none() {
            warn!(
                event_type = kind.as_str(),
                "broker is not available for the broadcaster, message will not be published"
            );
        }
        self.broker.as_ref()
    }
}

async fn publish_with(broker: &Arc<dyn Broker>, event: Event) -> Result<(), PublishError> {
    let envelope = broker.build_envelope(&event).map_err(|e| {
        error!(
            broker = broker.name(),
            event_type = event.event_type(),
            seq = event.seq(),
            error = %e,
            "error building envelope"
        );
        e
    })?;

    broker.send_message(envelope).await.map_err(|e| {
        error!(
            broker = broker.name(),
            event_type = event.event_type(),
            seq = event.seq(),
            error = %e,
            label = e.as_label(),
            "error sending envelope"
        );
        e
    })?;

    debug!(
        broker = broker.name(),
        event_type = event.event_type(),
        seq = event.seq(),
        "event published"
    );
    Ok(())
}

#[async_trait]
impl EventHandler for Relay {
    async fn on_add(&self, resource: Snapshot) -> Result<(), PublishError> {
        match self.available(EventKind::Added) {
            Some(broker) => publish_with(broker, Event::on_added(resource)).await,
            None => Ok(()),
        }
    }

    async fn on_update(&self, old: Snapshot, new: Snapshot) -> Result<(), PublishError> {
        match self.available(EventKind::Updated) {
            Some(broker) => publish_with(broker, Event::on_updated(old, new)).await,
            None => Ok(()),
        }
    }

    async fn on_delete(&self, resource: Snapshot) -> Result<(), PublishError> {
        match self.available(EventKind::Deleted) {
            Some(broker) => publish_with(broker, Event::on_deleted(resource)).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brokers::base_envelope;
    use crate::events::{Envelope, EVENT_TYPE_HEADER};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// Captures sent envelopes; fails the next send when `fail_next` is set.
    #[derive(Default)]
    struct Capture {
        sent: Mutex<Vec<Envelope>>,
        builds: AtomicUsize,
        fail_next: AtomicBool,
    }

    #[async_trait]
    impl Broker for Capture {
        fn build_envelope(&self, event: &Event) -> Result<Envelope, PublishError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            base_envelope(event)
        }

        async fn send_message(&self, envelope: Envelope) -> Result<(), PublishError> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(PublishError::Delivery {
                    backend: "capture",
                    reason: "simulated transport error".into(),
                });
            }
            self.sent.lock().await.push(envelope);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "capture"
        }
    }

    struct Unroutable;

    #[async_trait]
    impl Broker for Unroutable {
        fn build_envelope(&self, _event: &Event) -> Result<Envelope, PublishError> {
            Err(PublishError::EnvelopeBuild {
                reason: "content not extractable".into(),
            })
        }

        async fn send_message(&self, _envelope: Envelope) -> Result<(), PublishError> {
            panic!("send_message must not run after a failed build");
        }
    }

    fn snap(id: u32) -> Snapshot {
        Snapshot::new(json!({"id": id})).unwrap()
    }

    #[tokio::test]
    async fn missing_broker_is_not_an_error() {
        let relay = Relay::new(None);
        relay.on_add(snap(1)).await.unwrap();
        relay.on_update(snap(1), snap(1)).await.unwrap();
        relay.on_delete(snap(1)).await.unwrap();
    }

    #[derive(Clone, Default)]
    struct LogBuf(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuf {
        type Writer = LogBuf;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn missing_broker_builds_no_event() {
        let logs = LogBuf::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let relay = Relay::new(None);
        relay.on_add(snap(1)).await.unwrap();
        relay.on_delete(snap(1)).await.unwrap();

        let out = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert_eq!(out.matches("message will not be published").count(), 2);
        assert!(out.contains("event_type=\"added\""));
        assert!(!out.contains("seq="));
    }

    #[tokio::test]
    async fn callbacks_tag_envelopes() {
        let broker = Arc::new(Capture::default());
        let relay = Relay::new(Some(broker.clone()));

        relay.on_add(snap(1)).await.unwrap();
        relay.on_update(snap(1), snap(2)).await.unwrap();
        relay.on_delete(snap(2)).await.unwrap();

        let sent = broker.sent.lock().await;
        let tags: Vec<_> = sent
            .iter()
            .map(|e| e.header(EVENT_TYPE_HEADER).unwrap())
            .collect();
        assert_eq!(tags, vec!["added", "updated", "deleted"]);
        assert_eq!(sent[1].message["NewObj"]["id"], 2);
    }

    #[tokio::test]
    async fn failed_send_is_returned_and_next_event_still_publishes() {
        let broker = Arc::new(Capture::default());
        let relay = Relay::new(Some(broker.clone()));

        broker.fail_next.store(true, Ordering::SeqCst);
        let err = relay.publish(Event::on_added(snap(1))).await.unwrap_err();
        assert!(matches!(err, PublishError::Delivery { .. }));

        relay.publish(Event::on_deleted(snap(2))).await.unwrap();

        let sent = broker.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].header(EVENT_TYPE_HEADER), Some("deleted"));
        assert_eq!(sent[0].message["id"], 2);
        assert_eq!(broker.builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_build_skips_send() {
        let relay = Relay::new(Some(Arc::new(Unroutable)));
        let err = relay.on_add(snap(1)).await.unwrap_err();
        assert!(matches!(err, PublishError::EnvelopeBuild { .. }));
    }
}
