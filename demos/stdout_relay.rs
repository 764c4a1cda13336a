//! # Example: Stdout Relay
//!
//! Wires an in-process watch manager to the stdout broker and feeds a few
//! fleet and game-server changes through it. Runs until Ctrl-C.
//!
//! ```bash
//! RUST_LOG=info cargo run --example stdout_relay
//! ```

use std::{sync::Arc, time::Duration};

use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use fleetcast::{
    Broadcaster, BrokerConfig, ChannelManager, RelayConfig, ResourceKind, Snapshot, WatchFeed,
};

fn fleet(name: &str, replicas: u32) -> Value {
    json!({
        "apiVersion": "agones.dev/v1",
        "kind": "Fleet",
        "metadata": {"name": name, "namespace": "default"},
        "spec": {"replicas": replicas},
    })
}

fn game_server(name: &str, state: &str) -> Value {
    json!({
        "apiVersion": "agones.dev/v1",
        "kind": "GameServer",
        "metadata": {"name": name, "namespace": "default"},
        "status": {"state": state},
    })
}

type DemoError = Box<dyn std::error::Error + Send + Sync>;

async fn feed_changes(fleets: WatchFeed, servers: WatchFeed) -> Result<(), DemoError> {
    fleets.added(Snapshot::new(fleet("arena", 2))?).await?;
    servers
        .added(Snapshot::new(game_server("arena-x7k2p", "Scheduled"))?)
        .await?;
    tokio::time::sleep(Duration::from_millis(300)).await;

    fleets
        .updated(Snapshot::new(fleet("arena", 2))?, Snapshot::new(fleet("arena", 3))?)
        .await?;
    servers
        .updated(
            Snapshot::new(game_server("arena-x7k2p", "Scheduled"))?,
            Snapshot::new(game_server("arena-x7k2p", "Ready"))?,
        )
        .await?;
    tokio::time::sleep(Duration::from_millis(300)).await;

    servers
        .deleted(Snapshot::new(game_server("arena-x7k2p", "Shutdown"))?)
        .await?;
    println!("[demo] sample changes sent, press Ctrl-C to stop");
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = RelayConfig {
        sync_period: Duration::from_secs(5),
        broker: Some(BrokerConfig::Stdout),
        ..RelayConfig::default()
    };
    let manager = Arc::new(ChannelManager::new(&cfg));

    let broadcaster = Broadcaster::builder(cfg)
        .with_manager(manager.clone())
        .with_watcher_for(ResourceKind::FLEET)
        .with_watcher_for(ResourceKind::GAME_SERVER)
        .build()?;

    let fleets = manager.feeds(&ResourceKind::FLEET).remove(0);
    let servers = manager.feeds(&ResourceKind::GAME_SERVER).remove(0);
    tokio::spawn(async move {
        if let Err(e) = feed_changes(fleets, servers).await {
            eprintln!("[demo] feeding changes failed: {e}");
        }
    });

    broadcaster.run().await?;
    Ok(())
}
