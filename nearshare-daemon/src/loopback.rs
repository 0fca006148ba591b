//! Loopback engine
//!
//! Development stand-in for the proprietary transfer engine. Accepts
//! every command and synthesizes the callbacks a real engine would
//! raise, so the router, host and clients can be exercised end to end
//! on a machine without the engine installed. Selected with the
//! `--loopback` flag.

use async_trait::async_trait;
use nearshare_core::{
    CallbackSender, EngineCallback, EngineInit, FileDropRequest, ProgressUpdate,
    SendRequestStatus, TransferEngine,
};
use std::sync::Mutex;
use tracing::{info, warn};

/// Total size limit the real engine enforces (10 GB)
const TOTAL_SIZE_LIMIT: u64 = 10 * 1024 * 1024 * 1024;

/// Engine double that echoes transfers back as instant completions
pub struct LoopbackEngine {
    state: Mutex<Option<LoopbackState>>,
}

struct LoopbackState {
    callbacks: CallbackSender,
    peer_id: String,
}

impl LoopbackEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }
}

impl Default for LoopbackEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransferEngine for LoopbackEngine {
    async fn initialize(
        &self,
        init: EngineInit,
        callbacks: CallbackSender,
    ) -> nearshare_core::Result<()> {
        info!(
            "Loopback engine initialized as {} on {}:{}",
            init.device_name, init.listen_host, init.listen_port
        );
        *self.state.lock().unwrap() = Some(LoopbackState {
            callbacks,
            peer_id: init.peer_id,
        });
        Ok(())
    }

    async fn send_multi_file_request(&self, serialized_file_list: String) -> SendRequestStatus {
        let guard = self.state.lock().unwrap();
        let Some(state) = guard.as_ref() else {
            return SendRequestStatus::CallbackNotRegistered;
        };

        let request = match FileDropRequest::from_json(&serialized_file_list) {
            Ok(request) => request,
            Err(e) => {
                warn!("Loopback engine rejecting request: {e}");
                return SendRequestStatus::BadArguments;
            }
        };

        let total_size = request.total_size();
        if total_size > TOTAL_SIZE_LIMIT {
            return SendRequestStatus::TotalSizeOverLimit;
        }

        // Echo the transfer back as one started and one completed record
        let base = ProgressUpdate {
            sender_ip: request.ip_port.clone(),
            sender_id: state.peer_id.clone(),
            device_name: "loopback".to_string(),
            current_file_name: request
                .files
                .first()
                .map(|f| f.path.clone())
                .unwrap_or_default(),
            received_file_count: 0,
            total_file_count: request.files.len() as u32,
            current_file_size: request.files.first().map(|f| f.size).unwrap_or(0),
            total_size,
            received_size: 0,
            timestamp: request.timestamp,
            is_completed: false,
        };

        let mut done = base.clone();
        done.received_file_count = done.total_file_count;
        done.received_size = done.total_size;
        done.is_completed = true;

        let _ = state.callbacks.send(EngineCallback::Progress(base));
        let _ = state.callbacks.send(EngineCallback::Progress(done));

        SendRequestStatus::Sent
    }

    async fn cancel_transfer(
        &self,
        _peer_endpoint: String,
        peer_id: String,
        timestamp: i64,
    ) -> nearshare_core::Result<()> {
        info!("Loopback engine: cancel for {peer_id}-{timestamp}");
        Ok(())
    }

    async fn update_download_path(&self, path: String) -> nearshare_core::Result<()> {
        info!("Loopback engine: download path set to {path}");
        Ok(())
    }

    async fn set_peer_identity(&self, id: String) -> nearshare_core::Result<()> {
        if let Some(state) = self.state.lock().unwrap().as_mut() {
            state.peer_id = id;
        }
        Ok(())
    }
}
