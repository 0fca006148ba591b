//! Transfer engine call surface
//!
//! The engine that actually discovers peers and moves bytes is an
//! opaque external component. This module pins down the seam: the
//! calls this core issues into it, the status codes it answers with,
//! and the callbacks it delivers. Callbacks arrive on the engine's own
//! threads and are handed to the router over a channel.

use crate::session::ProgressUpdate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Parameters for engine startup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineInit {
    pub device_name: String,
    pub root_path: String,
    pub download_path: String,
    pub peer_id: String,
    /// Serialized peer endpoint info as the engine expects it
    pub peer_endpoint: String,
    pub listen_host: String,
    pub listen_port: u16,
}

/// Engine status codes for a multi-file send request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRequestStatus {
    Sent,
    BadArguments,
    SendInProgress,
    ReceiveInProgress,
    CallbackNotRegistered,
    MessageTooLarge,
    TotalSizeOverLimit,
    TooManyPending,
    /// Code outside the documented 1..=8 range
    Unknown(i32),
}

impl SendRequestStatus {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => SendRequestStatus::Sent,
            2 => SendRequestStatus::BadArguments,
            3 => SendRequestStatus::SendInProgress,
            4 => SendRequestStatus::ReceiveInProgress,
            5 => SendRequestStatus::CallbackNotRegistered,
            6 => SendRequestStatus::MessageTooLarge,
            7 => SendRequestStatus::TotalSizeOverLimit,
            8 => SendRequestStatus::TooManyPending,
            other => SendRequestStatus::Unknown(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            SendRequestStatus::Sent => 1,
            SendRequestStatus::BadArguments => 2,
            SendRequestStatus::SendInProgress => 3,
            SendRequestStatus::ReceiveInProgress => 4,
            SendRequestStatus::CallbackNotRegistered => 5,
            SendRequestStatus::MessageTooLarge => 6,
            SendRequestStatus::TotalSizeOverLimit => 7,
            SendRequestStatus::TooManyPending => 8,
            SendRequestStatus::Unknown(code) => *code,
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, SendRequestStatus::Sent)
    }

    /// Message surfaced verbatim to the caller; non-success codes are
    /// never retried automatically
    pub fn user_message(&self) -> String {
        match self {
            SendRequestStatus::Sent => "Request sent".to_string(),
            SendRequestStatus::BadArguments => "Cannot send: Invalid request".to_string(),
            SendRequestStatus::SendInProgress => {
                "Cannot send: Another send is in progress".to_string()
            }
            SendRequestStatus::ReceiveInProgress => {
                "Cannot send: A receive is in progress".to_string()
            }
            SendRequestStatus::CallbackNotRegistered => {
                "Cannot send: Service not ready".to_string()
            }
            SendRequestStatus::MessageTooLarge => {
                "Cannot send: File list is too large".to_string()
            }
            SendRequestStatus::TotalSizeOverLimit => {
                "Cannot send: Total file size exceeds 10GB".to_string()
            }
            SendRequestStatus::TooManyPending => {
                "Cannot send: Too many pending transfers".to_string()
            }
            SendRequestStatus::Unknown(code) => {
                format!("Cannot send: Engine returned code {code}")
            }
        }
    }
}

/// Callbacks the engine delivers, free-threaded
#[derive(Debug, Clone)]
pub enum EngineCallback {
    /// Peer asks the user to confirm with an auth index
    AuthRequested { auth_index: i32 },
    /// Peer device status blob (JSON), one device per notification
    PeerStatus { json: String },
    /// Multi-file transfer progress record
    Progress(ProgressUpdate),
    /// Peer announced an incoming file list
    FileListStarted { sender_id: String, file_count: u32 },
    /// Generic engine error event
    Error {
        client_id: String,
        code: i32,
        args: [String; 4],
    },
}

/// Channel the engine posts callbacks into
pub type CallbackSender = mpsc::UnboundedSender<EngineCallback>;

/// Calls this core issues into the transfer/discovery engine
#[async_trait]
pub trait TransferEngine: Send + Sync {
    /// Start the engine; `callbacks` receives every event it raises
    async fn initialize(&self, init: EngineInit, callbacks: CallbackSender) -> crate::Result<()>;

    /// Request a multi-file send; the returned status maps the engine's
    /// numeric result
    async fn send_multi_file_request(&self, serialized_file_list: String) -> SendRequestStatus;

    /// Ask the engine to stop a transfer. Cancellation is not
    /// synchronous: finality arrives as a later terminal progress event.
    async fn cancel_transfer(
        &self,
        peer_endpoint: String,
        peer_id: String,
        timestamp: i64,
    ) -> crate::Result<()>;

    async fn update_download_path(&self, path: String) -> crate::Result<()>;

    async fn set_peer_identity(&self, id: String) -> crate::Result<()>;
}

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    //! Scripted engine double for router and host tests

    use super::*;
    use std::sync::Mutex;

    /// Records calls and answers sends with a configurable status
    pub struct MockEngine {
        pub send_status: Mutex<SendRequestStatus>,
        pub sent_file_lists: Mutex<Vec<String>>,
        pub cancelled: Mutex<Vec<(String, String, i64)>>,
        pub download_paths: Mutex<Vec<String>>,
        callbacks: Mutex<Option<CallbackSender>>,
    }

    impl MockEngine {
        pub fn new() -> Self {
            Self::with_send_status(SendRequestStatus::Sent)
        }

        pub fn with_send_status(status: SendRequestStatus) -> Self {
            Self {
                send_status: Mutex::new(status),
                sent_file_lists: Mutex::new(Vec::new()),
                cancelled: Mutex::new(Vec::new()),
                download_paths: Mutex::new(Vec::new()),
                callbacks: Mutex::new(None),
            }
        }

        /// Push a callback as if the engine raised it
        pub fn raise(&self, callback: EngineCallback) {
            let guard = self.callbacks.lock().unwrap();
            let tx = guard.as_ref().expect("engine not initialized");
            tx.send(callback).expect("callback channel closed");
        }
    }

    impl Default for MockEngine {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl TransferEngine for MockEngine {
        async fn initialize(
            &self,
            _init: EngineInit,
            callbacks: CallbackSender,
        ) -> crate::Result<()> {
            *self.callbacks.lock().unwrap() = Some(callbacks);
            Ok(())
        }

        async fn send_multi_file_request(
            &self,
            serialized_file_list: String,
        ) -> SendRequestStatus {
            self.sent_file_lists.lock().unwrap().push(serialized_file_list);
            *self.send_status.lock().unwrap()
        }

        async fn cancel_transfer(
            &self,
            peer_endpoint: String,
            peer_id: String,
            timestamp: i64,
        ) -> crate::Result<()> {
            self.cancelled
                .lock()
                .unwrap()
                .push((peer_endpoint, peer_id, timestamp));
            Ok(())
        }

        async fn update_download_path(&self, path: String) -> crate::Result<()> {
            self.download_paths.lock().unwrap().push(path);
            Ok(())
        }

        async fn set_peer_identity(&self, _id: String) -> crate::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_round_trip() {
        for code in 1..=8 {
            let status = SendRequestStatus::from_code(code);
            assert_eq!(status.code(), code);
            assert!(!matches!(status, SendRequestStatus::Unknown(_)));
        }
        assert_eq!(
            SendRequestStatus::from_code(42),
            SendRequestStatus::Unknown(42)
        );
    }

    #[test]
    fn test_size_limit_message_is_verbatim() {
        assert_eq!(
            SendRequestStatus::from_code(7).user_message(),
            "Cannot send: Total file size exceeds 10GB"
        );
    }

    #[test]
    fn test_only_code_one_is_sent() {
        assert!(SendRequestStatus::Sent.is_sent());
        for code in 2..=8 {
            assert!(!SendRequestStatus::from_code(code).is_sent());
        }
    }
}
