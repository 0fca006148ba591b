//! NearShare daemon library
//!
//! The privileged worker process: owns the transfer engine, routes its
//! callbacks into typed events, and serves the DBus command surface to
//! UI-process clients. The binary in `main.rs` assembles everything;
//! embedders with their own engine binding can call
//! [`run_with_engine`] directly.

pub mod config;
pub mod dbus;
pub mod loopback;
pub mod router;

use anyhow::{Context, Result};
use config::Config;
use dbus::{DbusServer, NearShareInterface, PeerSet};
use nearshare_core::{
    DeviceRegistry, EngineCallback, ServiceEvent, SessionTable, TransferEngine, TransferStore,
};
use router::EventRouter;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Assembled daemon, running until shutdown
pub struct Daemon {
    pub server: Arc<DbusServer>,
    router_task: tokio::task::JoinHandle<()>,
    broadcast_task: tokio::task::JoinHandle<()>,
}

/// Wire up store, registry, session table, router and DBus server
/// around the given engine and serve until shutdown
pub async fn run_with_engine(config: Config, engine: Arc<dyn TransferEngine>) -> Result<Daemon> {
    config
        .ensure_directories()
        .context("Failed to create directories")?;

    let peer_id = config
        .load_or_create_peer_id()
        .context("Failed to resolve peer id")?;

    let store = Arc::new(
        TransferStore::open(config.store_path()).context("Failed to open transfer history")?,
    );
    let registry = Arc::new(DeviceRegistry::new());
    let sessions = Arc::new(SessionTable::new());
    let peers = Arc::new(PeerSet::new());

    let (events_tx, events_rx) = mpsc::unbounded_channel::<ServiceEvent>();
    let (callbacks_tx, callbacks_rx) = mpsc::unbounded_channel::<EngineCallback>();

    let router = EventRouter::new(
        registry.clone(),
        sessions.clone(),
        store.clone(),
        events_tx.clone(),
        peer_id,
    );
    let router_task = tokio::spawn(router.run(callbacks_rx));

    let interface = NearShareInterface::new(
        engine,
        registry,
        sessions,
        store,
        peers.clone(),
        events_tx,
        callbacks_tx,
    );

    let server = Arc::new(DbusServer::start(interface, peers).await?);
    let broadcast_task = tokio::spawn(server.clone().run_broadcaster(events_rx));

    info!("Daemon assembled and serving");
    Ok(Daemon {
        server,
        router_task,
        broadcast_task,
    })
}

impl Daemon {
    /// Stop background loops; the DBus connection drops with the server
    pub async fn shutdown(self) {
        self.router_task.abort();
        self.broadcast_task.abort();
        info!("Daemon shut down");
    }
}
