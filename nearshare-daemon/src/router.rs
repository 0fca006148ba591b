//! Event router
//!
//! Translates raw engine callbacks into typed [`ServiceEvent`]s. Each
//! callback is validated at the boundary, applied to the device
//! registry / session table / history store, and the resulting event is
//! handed to the service host for broadcast.
//!
//! Protocol violations (regressive progress, updates for terminal
//! sessions) and malformed payloads are logged and dropped here; one
//! bad event never corrupts session state or reaches the clients as a
//! failure.

use nearshare_core::{
    Device, DeviceRegistry, EngineCallback, ServiceEvent, SessionEventKind, SessionTable,
    TransferDirection, TransferSession, TransferStore,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Routes engine callbacks into registry/session/store updates and
/// broadcast events
pub struct EventRouter {
    registry: Arc<DeviceRegistry>,
    sessions: Arc<SessionTable>,
    store: Arc<TransferStore>,
    events_tx: mpsc::UnboundedSender<ServiceEvent>,
    /// Our own peer id; progress records we originated are `Send`
    own_peer_id: String,
}

impl EventRouter {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        sessions: Arc<SessionTable>,
        store: Arc<TransferStore>,
        events_tx: mpsc::UnboundedSender<ServiceEvent>,
        own_peer_id: String,
    ) -> Self {
        Self {
            registry,
            sessions,
            store,
            events_tx,
            own_peer_id,
        }
    }

    /// Consume engine callbacks until the channel closes
    ///
    /// Also forwards device registry updates as `DeviceListChanged`
    /// events; registry mutations made outside this loop (e.g.
    /// reconciliation on recovery) reach the clients the same way.
    pub async fn run(self, mut callbacks: mpsc::UnboundedReceiver<EngineCallback>) {
        let mut registry_updates = self.registry.subscribe();
        info!("Event router started");

        loop {
            tokio::select! {
                callback = callbacks.recv() => {
                    match callback {
                        Some(cb) => self.handle_callback(cb),
                        None => break,
                    }
                }
                update = registry_updates.recv() => {
                    match update {
                        Some(update) => {
                            self.emit(ServiceEvent::DeviceListChanged(update));
                        }
                        None => break,
                    }
                }
            }
        }

        info!("Event router stopped");
    }

    /// Apply one engine callback
    pub fn handle_callback(&self, callback: EngineCallback) {
        match callback {
            EngineCallback::AuthRequested { auth_index } => {
                info!("Engine requested auth confirmation (index {auth_index})");
                self.emit(ServiceEvent::AuthRequested { auth_index });
            }
            EngineCallback::PeerStatus { json } => self.handle_peer_status(&json),
            EngineCallback::Progress(update) => self.handle_progress(update),
            EngineCallback::FileListStarted {
                sender_id,
                file_count,
            } => {
                info!("Peer {sender_id} announced an incoming list of {file_count} file(s)");
            }
            EngineCallback::Error {
                client_id,
                code,
                args,
            } => {
                let message = args
                    .iter()
                    .filter(|a| !a.is_empty())
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("; ");
                warn!("Engine error {code} for client {client_id}: {message}");
                self.emit(ServiceEvent::ErrorOccurred {
                    client_id,
                    code,
                    message,
                });
            }
        }
    }

    fn handle_peer_status(&self, json: &str) {
        let device: Device = match serde_json::from_str(json) {
            Ok(device) => device,
            Err(e) => {
                warn!("Dropping malformed peer status blob: {e}");
                return;
            }
        };
        if device.id.is_empty() {
            warn!("Dropping peer status without a device id");
            return;
        }

        debug!("Peer status for {} (status {})", device.id, device.status);
        // The registry publishes the resulting list + delta; the run
        // loop turns that into a DeviceListChanged event.
        self.registry.apply_update(device);
    }

    fn handle_progress(&self, update: nearshare_core::ProgressUpdate) {
        let direction = if update.sender_id == self.own_peer_id {
            TransferDirection::Send
        } else {
            TransferDirection::Receive
        };

        let (session, kind) = match self.sessions.apply(&update, direction) {
            Ok(applied) => applied,
            Err(e) => {
                // Dropped, not propagated: the session state stays as it was
                warn!("Dropping progress update: {e}");
                return;
            }
        };

        self.persist(&session);

        let event = match kind {
            SessionEventKind::Started => ServiceEvent::TransferStarted(session),
            SessionEventKind::Updated => ServiceEvent::TransferUpdated(session),
            SessionEventKind::Completed => ServiceEvent::TransferCompleted(session),
        };
        self.emit(event);
    }

    /// Write the session to the history store. A failed write leaves
    /// the in-memory view ahead of the durable one until the next
    /// successful write; that divergence is logged, not hidden.
    fn persist(&self, session: &TransferSession) {
        if let Err(e) = self.store.upsert(session) {
            warn!(
                "Failed to persist session {} (history now stale): {e}",
                session.session_id
            );
        }
    }

    fn emit(&self, event: ServiceEvent) {
        if self.events_tx.send(event).is_err() {
            warn!("Service host event channel closed, event dropped");
        }
    }
}
