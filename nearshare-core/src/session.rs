//! Transfer session bookkeeping
//!
//! A [`TransferSession`] captures the identity and progress of one
//! multi-file transfer. Sessions are created from the first engine
//! progress record for a session id and advanced in place by later
//! records for the same id. The session id is derived deterministically
//! from the sender id and the transfer start timestamp, so repeated
//! updates for the same logical transfer always resolve to the same
//! record.
//!
//! Two invariants are enforced here rather than trusted from the wire:
//!
//! - Progress is monotonic: `received_file_count` and `received_size`
//!   never decrease. A regressive update is a protocol violation and is
//!   dropped, not applied.
//! - A session is completed only when its status says so *and* both the
//!   file count and byte count have reached their totals. A late
//!   "completed" flag with partial counts leaves the session in
//!   progress.
//!
//! Terminal sessions (completed, failed, cancelled) never reopen.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Direction of a transfer relative to this machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Send,
    Receive,
}

/// Lifecycle status of a transfer session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    Paused,
}

impl TransferStatus {
    /// Terminal states accept no further progress updates
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Failed | TransferStatus::Cancelled
        )
    }

    /// Stable wire/storage name, matching the serde representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::InProgress => "inProgress",
            TransferStatus::Completed => "completed",
            TransferStatus::Failed => "failed",
            TransferStatus::Cancelled => "cancelled",
            TransferStatus::Paused => "paused",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransferStatus::Pending),
            "inProgress" => Some(TransferStatus::InProgress),
            "completed" => Some(TransferStatus::Completed),
            "failed" => Some(TransferStatus::Failed),
            "cancelled" => Some(TransferStatus::Cancelled),
            "paused" => Some(TransferStatus::Paused),
            _ => None,
        }
    }
}

impl TransferDirection {
    /// Stable wire/storage name, matching the serde representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferDirection::Send => "send",
            TransferDirection::Receive => "receive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "send" => Some(TransferDirection::Send),
            "receive" => Some(TransferDirection::Receive),
            _ => None,
        }
    }
}

/// Raw multi-file progress record as delivered by the transfer engine
///
/// `timestamp` is the transfer start time in milliseconds and is
/// constant across all records for one transfer; together with
/// `sender_id` it forms the session id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub sender_ip: String,
    pub sender_id: String,
    pub device_name: String,
    pub current_file_name: String,
    pub received_file_count: u32,
    pub total_file_count: u32,
    pub current_file_size: u64,
    pub total_size: u64,
    pub received_size: u64,
    pub timestamp: i64,
    /// Completion claim from the engine. Advisory only: the session is
    /// completed by reaching its totals, never by this flag alone.
    #[serde(default)]
    pub is_completed: bool,
}

impl ProgressUpdate {
    /// Composite session key for this update
    pub fn session_id(&self) -> String {
        format!("{}-{}", self.sender_id, self.timestamp)
    }
}

/// One multi-file transfer's identity, progress and terminal outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSession {
    pub session_id: String,
    pub sender_ip: String,
    pub sender_id: String,
    pub device_name: String,
    pub direction: TransferDirection,
    pub status: TransferStatus,
    /// Transfer start time (unix milliseconds)
    pub start_time: i64,
    /// Set once when the session reaches a terminal state
    #[serde(default)]
    pub end_time: Option<i64>,
    /// Wall-clock time of the most recent accepted update
    pub last_update_time: i64,
    pub total_file_count: u32,
    pub received_file_count: u32,
    pub total_size: u64,
    pub received_size: u64,
    pub current_file_name: String,
    pub current_file_size: u64,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub error_code: Option<i32>,
}

impl TransferSession {
    /// Build a new session from the first progress record for its id
    pub fn from_progress(update: &ProgressUpdate, direction: TransferDirection) -> Self {
        let status = if update.received_size == 0 && update.received_file_count == 0 {
            TransferStatus::Pending
        } else {
            TransferStatus::InProgress
        };

        let mut session = Self {
            session_id: update.session_id(),
            sender_ip: update.sender_ip.clone(),
            sender_id: update.sender_id.clone(),
            device_name: update.device_name.clone(),
            direction,
            status,
            start_time: update.timestamp,
            end_time: None,
            last_update_time: now_millis(),
            total_file_count: update.total_file_count,
            received_file_count: update.received_file_count,
            total_size: update.total_size,
            received_size: update.received_size,
            current_file_name: update.current_file_name.clone(),
            current_file_size: update.current_file_size,
            error_message: None,
            error_code: None,
        };

        session.promote_if_complete(update.is_completed);
        session
    }

    /// Apply a later progress record for this session
    ///
    /// Monotonic fields only: a decrease in `received_file_count` or
    /// `received_size` is rejected and the session is left unchanged.
    /// Updates for terminal sessions are rejected the same way.
    pub fn update_progress(&mut self, update: &ProgressUpdate) -> Result<()> {
        let update_id = update.session_id();
        if update_id != self.session_id {
            return Err(CoreError::ProtocolViolation(format!(
                "update for session {} applied to session {}",
                update_id, self.session_id
            )));
        }

        if self.status.is_terminal() {
            return Err(CoreError::ProtocolViolation(format!(
                "session {} is {:?}, update dropped",
                self.session_id, self.status
            )));
        }

        if update.received_file_count < self.received_file_count
            || update.received_size < self.received_size
        {
            return Err(CoreError::ProtocolViolation(format!(
                "regressive progress for session {}: files {}->{}, bytes {}->{}",
                self.session_id,
                self.received_file_count,
                update.received_file_count,
                self.received_size,
                update.received_size
            )));
        }

        if update.received_file_count > update.total_file_count
            || update.received_size > update.total_size
        {
            return Err(CoreError::ProtocolViolation(format!(
                "progress for session {} exceeds totals: files {}/{}, bytes {}/{}",
                self.session_id,
                update.received_file_count,
                update.total_file_count,
                update.received_size,
                update.total_size
            )));
        }

        self.sender_ip = update.sender_ip.clone();
        self.device_name = update.device_name.clone();
        self.total_file_count = update.total_file_count;
        self.total_size = update.total_size;
        self.received_file_count = update.received_file_count;
        self.received_size = update.received_size;
        self.current_file_name = update.current_file_name.clone();
        self.current_file_size = update.current_file_size;
        self.last_update_time = now_millis();

        if self.status == TransferStatus::Pending
            && (self.received_size > 0 || self.received_file_count > 0)
        {
            self.status = TransferStatus::InProgress;
        }

        self.promote_if_complete(update.is_completed);
        Ok(())
    }

    /// Promote to `Completed` only when both counts and sizes have
    /// reached their totals. A completion claim with partial counts is
    /// logged and ignored.
    fn promote_if_complete(&mut self, claimed: bool) {
        let totals_reached = self.total_size > 0
            && self.received_size >= self.total_size
            && self.received_file_count >= self.total_file_count;

        if totals_reached {
            self.status = TransferStatus::Completed;
            self.end_time = Some(now_millis());
        } else if claimed {
            warn!(
                "Session {} claims completion with partial progress ({}/{} files, {}/{} bytes), keeping {:?}",
                self.session_id,
                self.received_file_count,
                self.total_file_count,
                self.received_size,
                self.total_size,
                self.status
            );
        }
    }

    /// Force the session into `Failed` with an error message
    ///
    /// Idempotent: calling on an already-terminal session is a no-op.
    pub fn set_error(&mut self, message: impl Into<String>, code: Option<i32>) {
        if self.status.is_terminal() {
            debug!(
                "Session {} already {:?}, ignoring error",
                self.session_id, self.status
            );
            return;
        }
        self.status = TransferStatus::Failed;
        self.error_message = Some(message.into());
        self.error_code = code;
        self.end_time = Some(now_millis());
        self.last_update_time = now_millis();
    }

    /// Force the session into `Cancelled`
    ///
    /// Idempotent: calling on an already-terminal session is a no-op.
    pub fn cancel(&mut self) {
        if self.status.is_terminal() {
            debug!(
                "Session {} already {:?}, ignoring cancel",
                self.session_id, self.status
            );
            return;
        }
        self.status = TransferStatus::Cancelled;
        self.end_time = Some(now_millis());
        self.last_update_time = now_millis();
    }

    /// Completed means status *and* totals agree; a status flag alone is
    /// not sufficient
    pub fn is_completed(&self) -> bool {
        self.status == TransferStatus::Completed
            && self.received_file_count >= self.total_file_count
            && self.received_size >= self.total_size
    }

    /// Fraction of bytes received, 0.0 when the total is unknown
    pub fn total_progress(&self) -> f64 {
        if self.total_size == 0 {
            0.0
        } else {
            self.received_size as f64 / self.total_size as f64
        }
    }

    /// Estimated transfer speed in bytes per second
    pub fn estimated_speed(&self) -> f64 {
        let reference = self.end_time.unwrap_or(self.last_update_time);
        let elapsed_secs = (reference - self.start_time) as f64 / 1000.0;
        if elapsed_secs <= 0.0 {
            0.0
        } else {
            self.received_size as f64 / elapsed_secs
        }
    }

    /// Estimated seconds until completion, `None` when the speed is
    /// unknown
    pub fn estimated_time_remaining(&self) -> Option<f64> {
        let speed = self.estimated_speed();
        if speed <= 0.0 {
            return None;
        }
        let remaining = self.total_size.saturating_sub(self.received_size);
        Some(remaining as f64 / speed)
    }

    /// Transport-neutral map representation for the process boundary
    ///
    /// Derived fields (progress fraction, speed, ETA) are intentionally
    /// absent; receivers recompute them instead of trusting the wire.
    pub fn to_map(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Rebuild a session from its map representation
    ///
    /// Optional fields absent in records written by older versions
    /// default to empty. A map without a session id is rejected.
    pub fn from_map(value: serde_json::Value) -> Result<Self> {
        let session: TransferSession = serde_json::from_value(value)?;
        if session.session_id.is_empty() {
            return Err(CoreError::InvalidPayload(
                "session record missing sessionId".into(),
            ));
        }
        Ok(session)
    }
}

/// What an applied progress record meant for the session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEventKind {
    /// First record for this session id
    Started,
    /// Progress advanced
    Updated,
    /// The record moved the session into a terminal state
    Completed,
}

/// In-memory table of active and recently finished sessions
///
/// All mutation is serialized behind one mutex; readers always see a
/// state that existed at some real point in time.
pub struct SessionTable {
    sessions: Mutex<HashMap<String, TransferSession>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Apply one engine progress record, creating the session on first
    /// sight. Returns the resulting session snapshot and what happened.
    ///
    /// Protocol violations (regressive progress, terminal session)
    /// leave the table unchanged and surface as errors for the caller
    /// to log and drop.
    pub fn apply(
        &self,
        update: &ProgressUpdate,
        direction: TransferDirection,
    ) -> Result<(TransferSession, SessionEventKind)> {
        let mut sessions = self.sessions.lock().expect("session table poisoned");
        let id = update.session_id();

        match sessions.get_mut(&id) {
            Some(session) => {
                session.update_progress(update)?;
                let kind = if session.status.is_terminal() {
                    SessionEventKind::Completed
                } else {
                    SessionEventKind::Updated
                };
                Ok((session.clone(), kind))
            }
            None => {
                let session = TransferSession::from_progress(update, direction);
                let kind = if session.status.is_terminal() {
                    SessionEventKind::Completed
                } else {
                    SessionEventKind::Started
                };
                sessions.insert(id, session.clone());
                Ok((session, kind))
            }
        }
    }

    /// Mark a session failed; no-op on terminal sessions
    pub fn set_error(
        &self,
        session_id: &str,
        message: &str,
        code: Option<i32>,
    ) -> Result<TransferSession> {
        let mut sessions = self.sessions.lock().expect("session table poisoned");
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| CoreError::SessionNotFound(session_id.to_string()))?;
        session.set_error(message, code);
        Ok(session.clone())
    }

    /// Mark a session cancelled; no-op on terminal sessions
    ///
    /// Finality is still confirmed by a later terminal progress event
    /// from the engine; bytes already queued below may keep arriving.
    pub fn cancel(&self, session_id: &str) -> Result<TransferSession> {
        let mut sessions = self.sessions.lock().expect("session table poisoned");
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| CoreError::SessionNotFound(session_id.to_string()))?;
        session.cancel();
        Ok(session.clone())
    }

    pub fn get(&self, session_id: &str) -> Option<TransferSession> {
        let sessions = self.sessions.lock().expect("session table poisoned");
        sessions.get(session_id).cloned()
    }

    /// Snapshot of all sessions, newest first
    pub fn snapshot(&self) -> Vec<TransferSession> {
        let sessions = self.sessions.lock().expect("session table poisoned");
        let mut list: Vec<_> = sessions.values().cloned().collect();
        list.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        list
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Current UNIX timestamp in milliseconds
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(received_files: u32, received_bytes: u64) -> ProgressUpdate {
        ProgressUpdate {
            sender_ip: "192.168.1.20:4411".into(),
            sender_id: "A".into(),
            device_name: "Mac".into(),
            current_file_name: "photo.jpg".into(),
            received_file_count: received_files,
            total_file_count: 2,
            current_file_size: 512,
            total_size: 1024,
            received_size: received_bytes,
            timestamp: 1000,
            is_completed: false,
        }
    }

    #[test]
    fn test_session_id_is_deterministic() {
        let u = update(0, 0);
        assert_eq!(u.session_id(), "A-1000");
        let session = TransferSession::from_progress(&u, TransferDirection::Receive);
        assert_eq!(session.session_id, "A-1000");
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut session =
            TransferSession::from_progress(&update(1, 512), TransferDirection::Receive);

        let err = session.update_progress(&update(1, 256)).unwrap_err();
        assert!(err.is_protocol_violation());

        // Dropped update leaves state untouched
        assert_eq!(session.received_size, 512);
        assert_eq!(session.status, TransferStatus::InProgress);
    }

    #[test]
    fn test_two_updates_reach_completed() {
        let mut session =
            TransferSession::from_progress(&update(1, 512), TransferDirection::Receive);
        assert_eq!(session.status, TransferStatus::InProgress);

        session.update_progress(&update(2, 1024)).unwrap();
        assert_eq!(session.status, TransferStatus::Completed);
        assert!(session.is_completed());
        assert_eq!(session.total_progress(), 1.0);
        assert!(session.end_time.is_some());
    }

    #[test]
    fn test_completion_claim_with_partial_counts_is_ignored() {
        let mut claimed = update(1, 512);
        claimed.is_completed = true;

        let mut session =
            TransferSession::from_progress(&update(1, 256), TransferDirection::Receive);
        session.update_progress(&claimed).unwrap();

        assert_eq!(session.status, TransferStatus::InProgress);
        assert!(!session.is_completed());
    }

    #[test]
    fn test_terminal_sessions_reject_updates() {
        let mut session =
            TransferSession::from_progress(&update(1, 512), TransferDirection::Receive);
        session.cancel();
        assert_eq!(session.status, TransferStatus::Cancelled);

        let err = session.update_progress(&update(2, 1024)).unwrap_err();
        assert!(err.is_protocol_violation());
        assert_eq!(session.status, TransferStatus::Cancelled);
    }

    #[test]
    fn test_cancel_and_set_error_are_idempotent() {
        let mut session =
            TransferSession::from_progress(&update(1, 512), TransferDirection::Send);
        session.set_error("peer vanished", Some(14));
        let first_end = session.end_time;

        session.set_error("second error", Some(15));
        session.cancel();

        assert_eq!(session.status, TransferStatus::Failed);
        assert_eq!(session.error_message.as_deref(), Some("peer vanished"));
        assert_eq!(session.end_time, first_end);
    }

    #[test]
    fn test_map_round_trip_preserves_stored_fields() {
        let session = TransferSession::from_progress(&update(1, 512), TransferDirection::Receive);
        let map = session.to_map().unwrap();

        // Derived fields never cross the wire
        assert!(map.get("totalProgress").is_none());
        assert!(map.get("estimatedSpeed").is_none());

        let restored = TransferSession::from_map(map).unwrap();
        assert_eq!(restored.session_id, session.session_id);
        assert_eq!(restored.received_size, session.received_size);
        assert_eq!(restored.status, session.status);
        assert_eq!(restored.direction, session.direction);
    }

    #[test]
    fn test_from_map_tolerates_missing_optional_fields() {
        let map = serde_json::json!({
            "sessionId": "A-1000",
            "senderIp": "192.168.1.20:4411",
            "senderId": "A",
            "deviceName": "Mac",
            "direction": "receive",
            "status": "inProgress",
            "startTime": 1000,
            "lastUpdateTime": 2000,
            "totalFileCount": 2,
            "receivedFileCount": 1,
            "totalSize": 1024,
            "receivedSize": 512,
            "currentFileName": "photo.jpg",
            "currentFileSize": 512
        });

        let session = TransferSession::from_map(map).unwrap();
        assert_eq!(session.end_time, None);
        assert_eq!(session.error_message, None);
    }

    #[test]
    fn test_from_map_rejects_missing_session_id() {
        let map = serde_json::json!({ "senderId": "A" });
        assert!(TransferSession::from_map(map).is_err());
    }

    #[test]
    fn test_eta_undefined_at_zero_speed() {
        let mut session =
            TransferSession::from_progress(&update(0, 0), TransferDirection::Receive);
        session.last_update_time = session.start_time;
        assert_eq!(session.estimated_speed(), 0.0);
        assert!(session.estimated_time_remaining().is_none());
    }

    #[test]
    fn test_table_applies_updates_in_place() {
        let table = SessionTable::new();

        let (s1, kind1) = table
            .apply(&update(1, 512), TransferDirection::Receive)
            .unwrap();
        assert_eq!(kind1, SessionEventKind::Started);
        assert_eq!(s1.received_size, 512);

        let (s2, kind2) = table
            .apply(&update(2, 1024), TransferDirection::Receive)
            .unwrap();
        assert_eq!(kind2, SessionEventKind::Completed);
        assert!(s2.is_completed());
        assert_eq!(table.snapshot().len(), 1);

        // Terminal: a further update is dropped
        assert!(table
            .apply(&update(2, 1024), TransferDirection::Receive)
            .is_err());
    }
}
