//! Daemon transport
//!
//! The connection manager talks to the daemon through the [`Transport`]
//! and [`Channel`] traits so its queueing and retry behavior can be
//! tested against a scripted transport. [`DbusTransport`] is the real
//! implementation: a zbus proxy on the session bus, with optional
//! best-effort autolaunch of the daemon binary when the well-known name
//! has no owner.

use crate::error::{ClientError, Result};
use async_trait::async_trait;
use futures::stream::StreamExt;
use nearshare_core::{Device, ServiceEvent, ServiceStatus, SERVICE_NAME};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use zbus::names::BusName;
use zbus::Connection;

/// One RPC command, matching the daemon's DBus surface
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    InitializeService { config_json: String },
    GetServiceStatus,
    GetDeviceList,
    SendMultiFilesDropRequest { request_json: String },
    CancelFileTransfer {
        ip_port: String,
        client_id: String,
        timestamp: i64,
    },
    UpdateDownloadPath { path: String },
}

/// Typed answer to a [`Request`]
#[derive(Debug, Clone)]
pub enum Response {
    Initialized { ok: bool, detail: String },
    ServiceStatus(ServiceStatus),
    DeviceList(Vec<Device>),
    SendResult { is_sent: bool, message: String },
    Cancelled,
    DownloadPathUpdated,
}

/// Opens channels to the daemon
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self) -> Result<Box<dyn Channel>>;
}

/// One live connection to the daemon
#[async_trait]
pub trait Channel: Send + Sync {
    /// Liveness probe
    async fn ping(&self) -> Result<()>;

    /// Dispatch one command and wait for its typed answer
    async fn dispatch(&self, request: Request) -> Result<Response>;

    /// Register this client for daemon event broadcast
    async fn register(&self) -> Result<()>;

    /// Withdraw the registration
    async fn unregister(&self) -> Result<()>;

    /// Forward daemon events into `tx` until the daemon goes away.
    /// Dropping the sender is the liveness-loss signal to the caller.
    async fn subscribe(&self, tx: mpsc::UnboundedSender<ServiceEvent>) -> Result<()>;
}

/// Own module: the `service_event` signal declaration generates a
/// `ServiceEvent` message type that must not shadow the core event enum
mod daemon_proxy {
    use zbus::proxy;

    #[proxy(
        interface = "io.nearshare.Daemon",
        default_service = "io.nearshare.Daemon",
        default_path = "/io/nearshare/Daemon"
    )]
    pub(super) trait NearShareDaemon {
        async fn ping(&self) -> zbus::Result<String>;

        async fn initialize_service(&self, config_json: &str) -> zbus::Result<(bool, String)>;

        async fn get_service_status(&self) -> zbus::Result<(bool, String)>;

        async fn get_device_list(&self) -> zbus::Result<Vec<String>>;

        async fn send_multi_files_drop_request(
            &self,
            request_json: &str,
        ) -> zbus::Result<(bool, String)>;

        async fn cancel_file_transfer(
            &self,
            ip_port: &str,
            client_id: &str,
            timestamp: i64,
        ) -> zbus::Result<()>;

        async fn update_download_path(&self, path: &str) -> zbus::Result<()>;

        async fn register_client(&self, bus_name: &str) -> zbus::Result<bool>;

        async fn unregister_client(&self, bus_name: &str) -> zbus::Result<bool>;

        /// Signal: one JSON-encoded service event
        #[zbus(signal)]
        fn service_event(event_json: &str) -> zbus::Result<()>;
    }
}

use daemon_proxy::NearShareDaemonProxy;

/// Session-bus transport to the daemon
pub struct DbusTransport {
    autolaunch: bool,
    daemon_binary: Option<PathBuf>,
}

impl DbusTransport {
    pub fn new(autolaunch: bool, daemon_binary: Option<PathBuf>) -> Self {
        Self {
            autolaunch,
            daemon_binary,
        }
    }

    /// Spawn the daemon binary when the well-known name has no owner.
    /// Failures are logged, not fatal; the probe decides the outcome.
    async fn maybe_launch(&self, connection: &Connection) -> Result<()> {
        if !self.autolaunch {
            return Ok(());
        }

        let dbus = zbus::fdo::DBusProxy::new(connection)
            .await
            .map_err(zbus::Error::from)?;
        let name = BusName::try_from(SERVICE_NAME).map_err(zbus::Error::from)?;
        if dbus
            .name_has_owner(name)
            .await
            .map_err(zbus::Error::from)?
        {
            return Ok(());
        }

        let Some(binary) = &self.daemon_binary else {
            debug!("Daemon not running and no binary configured for autolaunch");
            return Ok(());
        };
        match std::process::Command::new(binary).spawn() {
            Ok(child) => info!("Launched daemon {} (pid {})", binary.display(), child.id()),
            Err(e) => warn!("Failed to launch daemon {}: {e}", binary.display()),
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for DbusTransport {
    async fn open(&self) -> Result<Box<dyn Channel>> {
        let connection = Connection::session().await?;
        self.maybe_launch(&connection).await?;

        let proxy = NearShareDaemonProxy::new(&connection).await?;
        Ok(Box::new(DbusChannel { connection, proxy }))
    }
}

struct DbusChannel {
    connection: Connection,
    proxy: NearShareDaemonProxy<'static>,
}

impl DbusChannel {
    fn own_bus_name(&self) -> Result<String> {
        self.connection
            .unique_name()
            .map(|name| name.to_string())
            .ok_or(ClientError::NotConnected)
    }
}

#[async_trait]
impl Channel for DbusChannel {
    async fn ping(&self) -> Result<()> {
        self.proxy.ping().await?;
        Ok(())
    }

    async fn dispatch(&self, request: Request) -> Result<Response> {
        match request {
            Request::InitializeService { config_json } => {
                let (ok, detail) = self.proxy.initialize_service(&config_json).await?;
                Ok(Response::Initialized { ok, detail })
            }
            Request::GetServiceStatus => {
                let (_running, json) = self.proxy.get_service_status().await?;
                let status: ServiceStatus = serde_json::from_str(&json)?;
                Ok(Response::ServiceStatus(status))
            }
            Request::GetDeviceList => {
                let raw = self.proxy.get_device_list().await?;
                let devices = raw
                    .iter()
                    .map(|json| serde_json::from_str::<Device>(json))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(Response::DeviceList(devices))
            }
            Request::SendMultiFilesDropRequest { request_json } => {
                let (is_sent, message) = self
                    .proxy
                    .send_multi_files_drop_request(&request_json)
                    .await?;
                Ok(Response::SendResult { is_sent, message })
            }
            Request::CancelFileTransfer {
                ip_port,
                client_id,
                timestamp,
            } => {
                self.proxy
                    .cancel_file_transfer(&ip_port, &client_id, timestamp)
                    .await?;
                Ok(Response::Cancelled)
            }
            Request::UpdateDownloadPath { path } => {
                self.proxy.update_download_path(&path).await?;
                Ok(Response::DownloadPathUpdated)
            }
        }
    }

    async fn register(&self) -> Result<()> {
        let bus_name = self.own_bus_name()?;
        self.proxy.register_client(&bus_name).await?;
        Ok(())
    }

    async fn unregister(&self) -> Result<()> {
        let bus_name = self.own_bus_name()?;
        self.proxy.unregister_client(&bus_name).await?;
        Ok(())
    }

    async fn subscribe(&self, tx: mpsc::UnboundedSender<ServiceEvent>) -> Result<()> {
        let mut events = self.proxy.receive_service_event().await?;
        let dbus = zbus::fdo::DBusProxy::new(&self.connection)
            .await
            .map_err(zbus::Error::from)?;
        let mut owner_changes = dbus
            .receive_name_owner_changed()
            .await
            .map_err(zbus::Error::from)?;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    signal = events.next() => {
                        let Some(signal) = signal else { break };
                        let Ok(args) = signal.args() else { continue };
                        match ServiceEvent::from_json(args.event_json()) {
                            Ok(event) => {
                                if tx.send(event).is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!("Dropping undecodable daemon event: {e}"),
                        }
                    }
                    change = owner_changes.next() => {
                        let Some(change) = change else { break };
                        let Ok(args) = change.args() else { continue };
                        // The daemon name losing its owner ends the stream
                        if args.name().as_str() == SERVICE_NAME && args.new_owner().is_none() {
                            break;
                        }
                    }
                }
            }
            debug!("Daemon event stream closed");
            // tx drops here; the manager treats that as liveness loss
        });
        Ok(())
    }
}
