//! Error handling for NearShare core
//!
//! A single error type covers session bookkeeping, the device registry,
//! the history store and the engine call surface. Underlying library
//! errors convert automatically via `thiserror`.
//!
//! Protocol violations (regressive progress, updates to terminal
//! sessions) carry their own variant so callers can drop the offending
//! update with a warning instead of failing the whole operation.

use thiserror::Error;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in NearShare core operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// I/O error (file system, process spawn, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// History database error
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Requested device is not in the registry
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Requested transfer session is unknown
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// An event violated the progress protocol and was dropped
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// A boundary payload was malformed or missing required fields
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The transfer engine rejected a command
    #[error("Engine error: {0}")]
    Engine(String),
}

impl CoreError {
    /// True for errors that mean "drop the update, keep the session";
    /// these must never be propagated as operation failures.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, CoreError::ProtocolViolation(_))
    }
}
