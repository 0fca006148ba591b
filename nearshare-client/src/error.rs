//! Client-side error types

use thiserror::Error;

/// Errors surfaced by the connection manager
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("a connection attempt is already in flight")]
    AlreadyConnecting,

    #[error("not connected to the daemon")]
    NotConnected,

    #[error("daemon did not answer the liveness probe in time")]
    ProbeTimeout,

    #[error("reconnect attempts exhausted")]
    RetriesExhausted,

    #[error("bus error: {0}")]
    Bus(#[from] zbus::Error),

    #[error("malformed daemon reply: {0}")]
    Json(#[from] serde_json::Error),

    #[error("daemon reported: {0}")]
    Daemon(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
