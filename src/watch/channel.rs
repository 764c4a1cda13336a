//! # In-process watch framework driven by channels.
//!
//! [`ChannelManager`] implements [`Manager`] without a cluster: changes are
//! pushed through [`WatchFeed`] handles (one per registered watcher) and
//! delivered to the bound [`EventHandler`]. It backs local runs, the demo and
//! tests, and mirrors how a controller framework schedules callbacks.
//!
//! ## Architecture
//! ```text
//! WatchFeed(kind A) ──► [queue A] ──► worker A ──► handler.on_add/on_update/on_delete
//! WatchFeed(kind B) ──► [queue B] ──► worker B ──► handler...
//!                        (bounded)       │
//!                                        ├─► global semaphore (max_concurrent)
//!                                        ├─► panic caught → logged, worker continues
//!                                        └─► resync tick → Updated(obj, obj) for cached objects
//! ```
//!
//! ## Rules
//! - One worker per watcher; changes of one watcher are handled sequentially (FIFO).
//! - Workers of different watchers run concurrently.
//! - On cancellation workers stop taking changes; the in-flight callback completes.
//! - Handler errors are logged at `debug` (the relay already logged them) and dropped.
//! - [`ChannelManager::fail`] reports a fatal framework error: `start` returns `Err`.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::RelayConfig;
use crate::error::WatchError;
use crate::events::{EventKind, Snapshot};
use crate::watch::{Connector, EventHandler, Manager, ResourceKind, Watcher};

/// A single observed change.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Added(Snapshot),
    Updated { old: Snapshot, new: Snapshot },
    Deleted(Snapshot),
}

impl Change {
    pub fn kind(&self) -> EventKind {
        match self {
            Change::Added(_) => EventKind::Added,
            Change::Updated { .. } => EventKind::Updated,
            Change::Deleted(_) => EventKind::Deleted,
        }
    }
}

/// Sending side of one watcher's change queue.
#[derive(Debug, Clone)]
pub struct WatchFeed {
    watcher: Watcher,
    tx: mpsc::Sender<Change>,
}

impl WatchFeed {
    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }

    /// Queues a change, waiting while the queue is full.
    ///
    /// Fails once the manager has stopped.
    pub async fn send(&self, change: Change) -> Result<(), WatchError> {
        self.tx.send(change).await.map_err(|_| WatchError::Closed {
            kind: self.watcher.kind().to_string(),
        })
    }

    pub async fn added(&self, resource: Snapshot) -> Result<(), WatchError> {
        self.send(Change::Added(resource)).await
    }

    pub async fn updated(&self, old: Snapshot, new: Snapshot) -> Result<(), WatchError> {
        self.send(Change::Updated { old, new }).await
    }

    pub async fn deleted(&self, resource: Snapshot) -> Result<(), WatchError> {
        self.send(Change::Deleted(resource)).await
    }
}

/// Registered watcher waiting for `start`.
struct Slot {
    watcher: Watcher,
    handler: Arc<dyn EventHandler>,
    tx: mpsc::Sender<Change>,
    rx: Option<mpsc::Receiver<Change>>,
}

/// Channel-driven [`Manager`].
pub struct ChannelManager {
    queue_capacity: usize,
    resync: Option<Duration>,
    semaphore: Option<Arc<Semaphore>>,
    slots: Mutex<Vec<Slot>>,
    next_id: AtomicU64,
    running: AtomicBool,
    fatal: CancellationToken,
    fatal_reason: Mutex<Option<String>>,
}

impl ChannelManager {
    /// Creates a manager using the queue, concurrency and resync settings of `cfg`.
    pub fn new(cfg: &RelayConfig) -> Self {
        Self {
            queue_capacity: cfg.queue_capacity_clamped(),
            resync: cfg.resync_period(),
            semaphore: cfg.concurrency_limit().map(Semaphore::new).map(Arc::new),
            slots: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            running: AtomicBool::new(false),
            fatal: CancellationToken::new(),
            fatal_reason: Mutex::new(None),
        }
    }

    /// Connector producing a fresh [`ChannelManager`] for each call.
    pub fn connector() -> impl Connector {
        |cfg: &RelayConfig| -> Result<Arc<dyn Manager>, WatchError> {
            Ok(Arc::new(ChannelManager::new(cfg)))
        }
    }

    /// Feed for a registered watcher.
    pub fn feed(&self, watcher: &Watcher) -> Option<WatchFeed> {
        lock(&self.slots)
            .iter()
            .find(|s| s.watcher.id() == watcher.id())
            .map(|s| WatchFeed {
                watcher: s.watcher.clone(),
                tx: s.tx.clone(),
            })
    }

    /// Feeds for every watcher registered for `kind`, in registration order.
    pub fn feeds(&self, kind: &ResourceKind) -> Vec<WatchFeed> {
        lock(&self.slots)
            .iter()
            .filter(|s| s.watcher.kind() == kind)
            .map(|s| WatchFeed {
                watcher: s.watcher.clone(),
                tx: s.tx.clone(),
            })
            .collect()
    }

    /// Reports a fatal framework error. A running `start` returns
    /// [`WatchError::Fatal`] after its workers drained.
    pub fn fail(&self, reason: impl Into<String>) {
        lock(&self.fatal_reason).get_or_insert_with(|| reason.into());
        self.fatal.cancel();
    }

    fn fatal_error(&self) -> WatchError {
        WatchError::Fatal {
            reason: lock(&self.fatal_reason)
                .clone()
                .unwrap_or_else(|| "unknown failure".to_string()),
        }
    }
}

#[async_trait]
impl Manager for ChannelManager {
    fn register(
        &self,
        kind: &ResourceKind,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Watcher, WatchError> {
        if self.running.load(Ordering::Acquire) {
            return Err(WatchError::Register {
                kind: kind.to_string(),
                reason: "manager is already running".to_string(),
            });
        }

        let watcher = Watcher::new(self.next_id.fetch_add(1, Ordering::Relaxed), kind.clone());
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        lock(&self.slots).push(Slot {
            watcher: watcher.clone(),
            handler,
            tx,
            rx: Some(rx),
        });

        debug!(watcher = %watcher, "watcher registered");
        Ok(watcher)
    }

    async fn start(&self, token: CancellationToken) -> Result<(), WatchError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(WatchError::AlreadyRunning);
        }

        let workers: Vec<(Worker, mpsc::Receiver<Change>)> = lock(&self.slots)
            .iter_mut()
            .filter_map(|slot| {
                let rx = slot.rx.take()?;
                let worker = Worker {
                    watcher: slot.watcher.clone(),
                    handler: Arc::clone(&slot.handler),
                    semaphore: self.semaphore.clone(),
                    resync: self.resync,
                    cache: HashMap::new(),
                };
                Some((worker, rx))
            })
            .collect();

        if workers.is_empty() {
            return Err(WatchError::Fatal {
                reason: "no watchers registered".to_string(),
            });
        }

        info!(watchers = workers.len(), "watch manager started");
        let stop = token.child_token();
        let mut set = JoinSet::new();
        for (worker, rx) in workers {
            set.spawn(worker.run(rx, stop.clone()));
        }

        let res = tokio::select! {
            _ = token.cancelled() => Ok(()),
            _ = self.fatal.cancelled() => Err(self.fatal_error()),
        };

        stop.cancel();
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "watch worker aborted");
            }
        }

        info!(clean = res.is_ok(), "watch manager stopped");
        res
    }
}

/// Delivery loop of one watcher.
struct Worker {
    watcher: Watcher,
    handler: Arc<dyn EventHandler>,
    semaphore: Option<Arc<Semaphore>>,
    resync: Option<Duration>,
    /// Last known state of live objects, keyed by `namespace/name`.
    cache: HashMap<String, Snapshot>,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::Receiver<Change>, stop: CancellationToken) {
        let mut resync = self.resync.map(|period| {
            let mut iv = time::interval_at(Instant::now() + period, period);
            iv.set_missed_tick_behavior(MissedTickBehavior::Delay);
            iv
        });

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(change) => self.dispatch(change).await,
                    None => break,
                },
                _ = tick(&mut resync) => self.resync_all(&stop).await,
            }
        }

        debug!(watcher = %self.watcher, "watcher stopped");
    }

    /// Re-delivers every cached object as an unchanged update.
    async fn resync_all(&mut self, stop: &CancellationToken) {
        let objects: Vec<Snapshot> = self.cache.values().cloned().collect();
        debug!(watcher = %self.watcher, objects = objects.len(), "resync");

        for obj in objects {
            if stop.is_cancelled() {
                return;
            }
            self.dispatch(Change::Updated {
                old: obj.clone(),
                new: obj,
            })
            .await;
        }
    }

    async fn dispatch(&mut self, change: Change) {
        let _permit = match &self.semaphore {
            Some(sem) => match Arc::clone(sem).acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_closed) => return,
            },
            None => None,
        };

        self.track(&change);
        let kind = change.kind();
        let handler = Arc::clone(&self.handler);
        let fut = async move {
            match change {
                Change::Added(resource) => handler.on_add(resource).await,
                Change::Updated { old, new } => handler.on_update(old, new).await,
                Change::Deleted(resource) => handler.on_delete(resource).await,
            }
        };

        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(watcher = %self.watcher, event_type = %kind, error = %e, "handler returned error");
            }
            Err(panic_err) => {
                error!(
                    watcher = %self.watcher,
                    event_type = %kind,
                    info = %panic_message(&*panic_err),
                    "handler panicked"
                );
            }
        }
    }

    fn track(&mut self, change: &Change) {
        match change {
            Change::Added(obj) | Change::Updated { new: obj, .. } => {
                if let Some(key) = obj.key() {
                    self.cache.insert(key, obj.clone());
                }
            }
            Change::Deleted(obj) => {
                if let Some(key) = obj.key() {
                    self.cache.remove(&key);
                }
            }
        }
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(iv) => {
            iv.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn panic_message(any: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
