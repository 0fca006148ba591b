//! NearShare Core
//!
//! Shared library for the NearShare desktop product: transfer session
//! bookkeeping, the peer device registry, the durable transfer history
//! store, the typed event surface between the daemon and UI clients,
//! and the call surface of the external transfer engine.

pub mod engine;
pub mod events;
pub mod registry;
pub mod rpc;
pub mod session;
pub mod store;

mod error;

pub use engine::{
    CallbackSender, EngineCallback, EngineInit, SendRequestStatus, TransferEngine,
};
pub use error::{CoreError, Result};
pub use events::ServiceEvent;
pub use registry::{
    Device, DeviceDelta, DeviceListUpdate, DeviceRegistry, DEVICE_OFFLINE, DEVICE_ONLINE,
};
pub use rpc::{FileDropRequest, FileEntry, ServiceStatus, OBJECT_PATH, SERVICE_NAME};
pub use session::{
    ProgressUpdate, SessionEventKind, SessionTable, TransferDirection, TransferSession,
    TransferStatus,
};
pub use store::{TransferStore, SCHEMA_VERSION};
