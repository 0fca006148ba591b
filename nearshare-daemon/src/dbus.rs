//! DBus service host
//!
//! Exposes the daemon's command surface to UI-process clients and
//! pushes router events back out. Clients register their unique bus
//! name on connect; events are emitted once per registered peer as a
//! destination-scoped signal, so one unreachable peer never blocks
//! delivery to the others. Command results go back to the calling peer
//! only, as the method reply.

use anyhow::{Context, Result};
use nearshare_core::{
    DeviceRegistry, EngineInit, FileDropRequest, ServiceEvent, ServiceStatus, SessionTable,
    TransferEngine, TransferStore, OBJECT_PATH, SERVICE_NAME,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use zbus::object_server::SignalEmitter;
use zbus::{connection, interface, Connection};

/// Registered UI-process peers, keyed by unique bus name
pub struct PeerSet {
    peers: RwLock<HashSet<String>>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self {
            peers: RwLock::new(HashSet::new()),
        }
    }

    pub async fn register(&self, bus_name: String) {
        info!("Client {bus_name} registered");
        self.peers.write().await.insert(bus_name);
    }

    pub async fn unregister(&self, bus_name: &str) {
        if self.peers.write().await.remove(bus_name) {
            info!("Client {bus_name} unregistered");
        }
    }

    pub async fn list(&self) -> Vec<String> {
        self.peers.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }
}

impl Default for PeerSet {
    fn default() -> Self {
        Self::new()
    }
}

/// DBus interface backing `io.nearshare.Daemon`
pub struct NearShareInterface {
    engine: Arc<dyn TransferEngine>,
    registry: Arc<DeviceRegistry>,
    sessions: Arc<SessionTable>,
    store: Arc<TransferStore>,
    peers: Arc<PeerSet>,
    /// Router event channel; events emitted here reach every peer
    events_tx: mpsc::UnboundedSender<ServiceEvent>,
    /// Channel handed to the engine at initialization
    callbacks_tx: nearshare_core::CallbackSender,
    engine_initialized: Arc<AtomicBool>,
}

impl NearShareInterface {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: Arc<dyn TransferEngine>,
        registry: Arc<DeviceRegistry>,
        sessions: Arc<SessionTable>,
        store: Arc<TransferStore>,
        peers: Arc<PeerSet>,
        events_tx: mpsc::UnboundedSender<ServiceEvent>,
        callbacks_tx: nearshare_core::CallbackSender,
    ) -> Self {
        Self {
            engine,
            registry,
            sessions,
            store,
            peers,
            events_tx,
            callbacks_tx,
            engine_initialized: Arc::new(AtomicBool::new(false)),
        }
    }

    fn emit(&self, event: ServiceEvent) {
        if self.events_tx.send(event).is_err() {
            warn!("Event channel closed, push event dropped");
        }
    }
}

#[interface(name = "io.nearshare.Daemon")]
impl NearShareInterface {
    /// Liveness probe; answers immediately when the service loop runs
    async fn ping(&self) -> String {
        "pong".to_string()
    }

    /// Start the transfer engine with the given configuration
    ///
    /// Idempotent: a second call while initialized reports success
    /// without restarting the engine.
    async fn initialize_service(&self, config_json: String) -> (bool, String) {
        debug!("DBus: InitializeService called");

        if self.engine_initialized.load(Ordering::SeqCst) {
            return (true, "already initialized".to_string());
        }

        let init: EngineInit = match serde_json::from_str(&config_json) {
            Ok(init) => init,
            Err(e) => {
                warn!("InitializeService with malformed config: {e}");
                return (false, format!("invalid service config: {e}"));
            }
        };

        match self
            .engine
            .initialize(init, self.callbacks_tx.clone())
            .await
        {
            Ok(()) => {
                self.engine_initialized.store(true, Ordering::SeqCst);
                info!("Transfer engine initialized");
                (true, String::new())
            }
            Err(e) => {
                warn!("Engine initialization failed: {e}");
                (false, e.to_string())
            }
        }
    }

    /// Service status as (running, info-json)
    async fn get_service_status(&self) -> (bool, String) {
        let status = ServiceStatus {
            running: true,
            engine_initialized: self.engine_initialized.load(Ordering::SeqCst),
            device_count: self.registry.len() as u32,
            active_sessions: self
                .sessions
                .snapshot()
                .iter()
                .filter(|s| !s.status.is_terminal())
                .count() as u32,
            version: env!("CARGO_PKG_VERSION").to_string(),
        };
        match serde_json::to_string(&status) {
            Ok(json) => (true, json),
            Err(e) => (true, format!("{{\"error\":\"{e}\"}}")),
        }
    }

    /// Current device list as JSON maps, ordered by device id
    async fn get_device_list(&self) -> Vec<String> {
        debug!("DBus: GetDeviceList called");
        self.registry
            .snapshot()
            .iter()
            .filter_map(|device| serde_json::to_string(device).ok())
            .collect()
    }

    /// Forward a multi-file send command to the engine
    ///
    /// The engine's status code maps 1:1 onto the reply; non-success
    /// codes are surfaced verbatim and never retried here. No session
    /// state is touched; sessions exist only once the engine reports
    /// progress.
    async fn send_multi_files_drop_request(&self, payload: String) -> (bool, String) {
        debug!("DBus: SendMultiFilesDropRequest called");

        let request = match FileDropRequest::from_json(&payload) {
            Ok(request) => request,
            Err(e) => {
                warn!("Rejecting malformed drop request: {e}");
                return (false, e.to_string());
            }
        };

        let serialized = match request.to_json() {
            Ok(json) => json,
            Err(e) => return (false, e.to_string()),
        };

        let status = self.engine.send_multi_file_request(serialized).await;
        if !status.is_sent() {
            info!(
                "Send request for {} rejected by engine (code {})",
                request.device_id,
                status.code()
            );
        }
        (status.is_sent(), status.user_message())
    }

    /// Cancel a transfer: mark the session terminal locally and notify
    /// the engine
    ///
    /// Finality is observed via a later terminal progress event from
    /// the engine; bytes already queued below this layer may still
    /// arrive.
    async fn cancel_file_transfer(
        &self,
        ip_port: String,
        client_id: String,
        timestamp: i64,
    ) -> (bool, String) {
        info!("DBus: CancelFileTransfer for {client_id}-{timestamp}");

        let session_id = format!("{client_id}-{timestamp}");
        match self.sessions.cancel(&session_id) {
            Ok(session) => {
                if let Err(e) = self.store.upsert(&session) {
                    warn!("Failed to persist cancelled session {session_id}: {e}");
                }
                self.emit(ServiceEvent::TransferCompleted(session));
            }
            Err(e) => {
                // The engine may still know the transfer; forward anyway
                warn!("Cancel for unknown session {session_id}: {e}");
            }
        }

        match self.engine.cancel_transfer(ip_port, client_id, timestamp).await {
            Ok(()) => (true, String::new()),
            Err(e) => (false, e.to_string()),
        }
    }

    /// Point the engine at a new download directory
    async fn update_download_path(&self, path: String) -> (bool, String) {
        info!("DBus: UpdateDownloadPath to {path}");
        match self.engine.update_download_path(path).await {
            Ok(()) => (true, String::new()),
            Err(e) => (false, e.to_string()),
        }
    }

    /// Register the calling client for push events
    async fn register_client(&self, bus_name: String) -> bool {
        self.peers.register(bus_name).await;
        true
    }

    /// Drop the calling client from push delivery
    async fn unregister_client(&self, bus_name: String) -> bool {
        self.peers.unregister(&bus_name).await;
        true
    }

    /// Signal: one service event, JSON-encoded `ServiceEvent`
    ///
    /// Emitted per registered peer with that peer as destination.
    #[zbus(signal)]
    async fn service_event(
        signal_emitter: &SignalEmitter<'_>,
        event_json: &str,
    ) -> zbus::Result<()>;
}

/// DBus server wrapper owning the connection and the peer set
pub struct DbusServer {
    connection: Connection,
    peers: Arc<PeerSet>,
}

impl DbusServer {
    /// Build the connection, serve the interface, then claim the
    /// well-known name
    pub async fn start(interface: NearShareInterface, peers: Arc<PeerSet>) -> Result<Self> {
        info!("Starting DBus server on {SERVICE_NAME}");

        let connection = connection::Builder::session()?
            .build()
            .await
            .context("Failed to build DBus connection")?;

        connection
            .object_server()
            .at(OBJECT_PATH, interface)
            .await
            .context("Failed to serve interface")?;

        connection
            .request_name(SERVICE_NAME)
            .await
            .context("Failed to request DBus name")?;

        info!("DBus server started");
        Ok(Self { connection, peers })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Push one event to every registered peer
    ///
    /// Delivery is isolated per peer: a failure to reach one peer is
    /// logged, that peer is pruned, and the remaining peers still
    /// receive the event. Each peer sees events in emission order; no
    /// ordering holds across peers.
    pub async fn notify_all(&self, event: &ServiceEvent) {
        let json = match event.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize service event: {e}");
                return;
            }
        };

        for peer in self.peers.list().await {
            let result = self
                .connection
                .emit_signal(
                    Some(peer.as_str()),
                    OBJECT_PATH,
                    SERVICE_NAME,
                    "ServiceEvent",
                    &(json.as_str(),),
                )
                .await;

            if let Err(e) = result {
                warn!("Failed to notify peer {peer}, pruning: {e}");
                self.peers.unregister(&peer).await;
            }
        }
    }

    /// Consume router events and broadcast each one
    pub async fn run_broadcaster(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<ServiceEvent>) {
        while let Some(event) = events.recv().await {
            debug!("Broadcasting service event to {} peer(s)", self.peers.len().await);
            self.notify_all(&event).await;
        }
        info!("Broadcast loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nearshare_core::engine::mock::MockEngine;
    use nearshare_core::{ProgressUpdate, SendRequestStatus, TransferDirection};

    fn interface_with(
        engine: Arc<MockEngine>,
    ) -> (
        NearShareInterface,
        Arc<SessionTable>,
        mpsc::UnboundedReceiver<ServiceEvent>,
        mpsc::UnboundedReceiver<nearshare_core::EngineCallback>,
    ) {
        let registry = Arc::new(DeviceRegistry::new());
        let sessions = Arc::new(SessionTable::new());
        let store = Arc::new(TransferStore::open_in_memory().unwrap());
        let peers = Arc::new(PeerSet::new());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (callbacks_tx, callbacks_rx) = mpsc::unbounded_channel();

        let interface = NearShareInterface::new(
            engine,
            registry,
            sessions.clone(),
            store,
            peers,
            events_tx,
            callbacks_tx,
        );
        (interface, sessions, events_rx, callbacks_rx)
    }

    fn drop_payload() -> String {
        r#"{"deviceId":"d1","ipPort":"192.168.1.20:4411","timestamp":1000,
            "files":[{"path":"/tmp/a.txt","size":512}]}"#
            .to_string()
    }

    #[tokio::test]
    async fn test_send_request_maps_engine_status() {
        let engine = Arc::new(MockEngine::new());
        let (interface, _, _, _) = interface_with(engine.clone());

        let (ok, message) = interface
            .send_multi_files_drop_request(drop_payload())
            .await;
        assert!(ok);
        assert_eq!(message, "Request sent");
        assert_eq!(engine.sent_file_lists.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_size_limit_rejection_mutates_nothing() {
        let engine = Arc::new(MockEngine::with_send_status(
            SendRequestStatus::TotalSizeOverLimit,
        ));
        let (interface, sessions, mut events_rx, _) = interface_with(engine);

        let (ok, message) = interface
            .send_multi_files_drop_request(drop_payload())
            .await;

        assert!(!ok);
        assert_eq!(message, "Cannot send: Total file size exceeds 10GB");
        assert!(sessions.snapshot().is_empty());
        assert!(events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_drop_request_is_rejected_before_engine() {
        let engine = Arc::new(MockEngine::new());
        let (interface, _, _, _) = interface_with(engine.clone());

        let (ok, _) = interface
            .send_multi_files_drop_request("not json".into())
            .await;
        assert!(!ok);
        assert!(engine.sent_file_lists.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_marks_session_and_notifies_engine() {
        let engine = Arc::new(MockEngine::new());
        let (interface, sessions, mut events_rx, _) = interface_with(engine.clone());

        let update = ProgressUpdate {
            sender_ip: "192.168.1.20:4411".into(),
            sender_id: "A".into(),
            device_name: "Mac".into(),
            current_file_name: "a.txt".into(),
            received_file_count: 1,
            total_file_count: 2,
            current_file_size: 512,
            total_size: 1024,
            received_size: 512,
            timestamp: 1000,
            is_completed: false,
        };
        sessions.apply(&update, TransferDirection::Receive).unwrap();

        let (ok, _) = interface
            .cancel_file_transfer("192.168.1.20:4411".into(), "A".into(), 1000)
            .await;
        assert!(ok);

        let session = sessions.get("A-1000").unwrap();
        assert_eq!(
            session.status,
            nearshare_core::TransferStatus::Cancelled
        );
        assert_eq!(engine.cancelled.lock().unwrap().len(), 1);
        assert!(matches!(
            events_rx.try_recv().unwrap(),
            ServiceEvent::TransferCompleted(_)
        ));
    }

    #[tokio::test]
    async fn test_initialize_service_is_idempotent() {
        let engine = Arc::new(MockEngine::new());
        let (interface, _, _, _callbacks_rx) = interface_with(engine);

        let init = r#"{"deviceName":"Desk","rootPath":"/tmp","downloadPath":"/tmp/dl",
            "peerId":"self","peerEndpoint":"","listenHost":"0.0.0.0","listenPort":4411}"#;

        let (ok, _) = interface.initialize_service(init.to_string()).await;
        assert!(ok);
        let (ok, message) = interface.initialize_service(init.to_string()).await;
        assert!(ok);
        assert_eq!(message, "already initialized");
    }

    #[tokio::test]
    async fn test_initialize_service_rejects_bad_config() {
        let engine = Arc::new(MockEngine::new());
        let (interface, _, _, _) = interface_with(engine);

        let (ok, message) = interface.initialize_service("{}".into()).await;
        assert!(!ok);
        assert!(message.contains("invalid service config"));
    }

    #[tokio::test]
    async fn test_status_reports_counts() {
        let engine = Arc::new(MockEngine::new());
        let (interface, _, _, _) = interface_with(engine);

        let (running, info) = interface.get_service_status().await;
        assert!(running);
        let status: ServiceStatus = serde_json::from_str(&info).unwrap();
        assert!(!status.engine_initialized);
        assert_eq!(status.device_count, 0);
    }

    #[tokio::test]
    async fn test_peer_set_register_unregister() {
        let peers = PeerSet::new();
        peers.register(":1.42".into()).await;
        peers.register(":1.42".into()).await;
        assert_eq!(peers.len().await, 1);

        peers.unregister(":1.42").await;
        assert_eq!(peers.len().await, 0);
    }
}
