//! NearShare client library
//!
//! Connection manager for UI processes talking to the NearShare
//! daemon: queued command dispatch, liveness probing, automatic
//! reconnection with backoff, and a typed event stream mirroring the
//! daemon's broadcasts.

pub mod error;
pub mod manager;
pub mod transport;

pub use error::{ClientError, Result};
pub use manager::{ClientConfig, ClientEvent, ConnectionState, ServiceClient};
pub use transport::{Channel, DbusTransport, Request, Response, Transport};

pub use nearshare_core::{
    Device, DeviceListUpdate, FileDropRequest, FileEntry, ServiceEvent, ServiceStatus,
    TransferSession, TransferStatus,
};
