//! Shared wire types for the UI ⇄ daemon RPC surface
//!
//! Commands cross the process boundary as JSON maps; field names are
//! the stable contract, the byte layout is not. Both sides validate at
//! the boundary and reject malformed payloads instead of defaulting.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};

/// Well-known bus name of the daemon service
pub const SERVICE_NAME: &str = "io.nearshare.Daemon";

/// Object path of the daemon service
pub const OBJECT_PATH: &str = "/io/nearshare/Daemon";

/// One file in a multi-file drop request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
}

/// A multi-file send command issued from the UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDropRequest {
    /// Target device id
    pub device_id: String,
    /// Target endpoint, `host:port`
    pub ip_port: String,
    /// Transfer start timestamp (unix ms), becomes part of the session id
    pub timestamp: i64,
    pub files: Vec<FileEntry>,
}

impl FileDropRequest {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let request: FileDropRequest = serde_json::from_str(json)
            .map_err(|e| CoreError::InvalidPayload(format!("bad file drop request: {e}")))?;
        if request.device_id.is_empty() || request.files.is_empty() {
            return Err(CoreError::InvalidPayload(
                "file drop request needs a device id and at least one file".into(),
            ));
        }
        Ok(request)
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Answer to `get_service_status`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub running: bool,
    pub engine_initialized: bool,
    pub device_count: u32,
    pub active_sessions: u32,
    pub version: String,
}
