//! Typed events crossing the process boundary
//!
//! One tagged sum type replaces ad-hoc per-event callbacks: every push
//! from the daemon to connected UI clients is a [`ServiceEvent`],
//! serialized as tagged JSON. Receivers validate the tag at the
//! boundary; an unknown tag is logged and dropped, never defaulted
//! into business logic.

use crate::error::{CoreError, Result};
use crate::registry::DeviceListUpdate;
use crate::session::TransferSession;
use serde::{Deserialize, Serialize};

/// Push events broadcast from the daemon to UI clients
///
/// Events are delivered to each peer in the order the router produced
/// them; no ordering holds across peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServiceEvent {
    /// Device registry changed; carries the full list plus the delta
    DeviceListChanged(DeviceListUpdate),
    /// First progress record for a new transfer
    TransferStarted(TransferSession),
    /// Progress advanced on an existing transfer
    TransferUpdated(TransferSession),
    /// Transfer reached a terminal state
    TransferCompleted(TransferSession),
    /// Peer requests auth confirmation
    #[serde(rename_all = "camelCase")]
    AuthRequested { auth_index: i32 },
    /// Engine raised an error event
    #[serde(rename_all = "camelCase")]
    ErrorOccurred {
        client_id: String,
        code: i32,
        message: String,
    },
}

impl ServiceEvent {
    /// Serialize for the signal channel
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a received event, rejecting unknown or malformed payloads
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| CoreError::InvalidPayload(format!("bad service event: {e}")))
    }
}
