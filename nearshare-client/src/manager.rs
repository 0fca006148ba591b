//! Connection manager
//!
//! UI-side handle to the daemon. Commands issued while disconnected are
//! queued and flushed in FIFO order once a connection is up; liveness
//! loss schedules linear-backoff reconnects up to a fixed cap, after
//! which the queue is drained as failures and the embedder is told via
//! [`ClientEvent::DaemonDisconnected`]. Completions travel over oneshot
//! channels, so redispatching to a UI thread is the embedder's choice.

use crate::error::{ClientError, Result};
use crate::transport::{Channel, DbusTransport, Request, Response, Transport};
use futures::future::BoxFuture;
use nearshare_core::{Device, FileDropRequest, ServiceEvent, ServiceStatus};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events delivered to the embedder
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A broadcast event from the daemon
    Service(ServiceEvent),
    /// Reconnect budget exhausted; an explicit `connect()` is required
    DaemonDisconnected,
    /// Connection re-established after a liveness loss
    DaemonReconnected,
}

/// Tunables for probing and reconnection
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Budget for the `ping` liveness probe during connect
    pub probe_timeout: Duration,
    /// Reconnect delay is `attempt * base_retry_delay`
    pub base_retry_delay: Duration,
    pub max_reconnect_attempts: u32,
    /// Spawn the daemon when the well-known name has no owner
    pub autolaunch: bool,
    pub daemon_binary: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(3),
            base_retry_delay: Duration::from_secs(1),
            max_reconnect_attempts: 5,
            autolaunch: false,
            daemon_binary: None,
        }
    }
}

/// A command waiting for a connection
struct PendingCommand {
    request: Request,
    reply: oneshot::Sender<Result<Response>>,
}

struct Inner {
    state: ConnectionState,
    channel: Option<Arc<dyn Channel>>,
    pending: VecDeque<PendingCommand>,
    /// Failed attempts since the last successful connect
    attempts: u32,
    /// Bumped on every connect/disconnect so stale event watchers
    /// cannot tear down a newer connection
    generation: u64,
}

struct Shared {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    events_tx: mpsc::UnboundedSender<ClientEvent>,
    inner: Mutex<Inner>,
}

/// Client handle to the daemon service
#[derive(Clone)]
pub struct ServiceClient {
    shared: Arc<Shared>,
}

impl ServiceClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: ClientConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let client = Self {
            shared: Arc::new(Shared {
                transport,
                config,
                events_tx,
                inner: Mutex::new(Inner {
                    state: ConnectionState::Disconnected,
                    channel: None,
                    pending: VecDeque::new(),
                    attempts: 0,
                    generation: 0,
                }),
            }),
        };
        (client, events_rx)
    }

    /// Client over the session bus
    pub fn session(config: ClientConfig) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let transport = Arc::new(DbusTransport::new(
            config.autolaunch,
            config.daemon_binary.clone(),
        ));
        Self::new(transport, config)
    }

    pub async fn state(&self) -> ConnectionState {
        self.shared.inner.lock().await.state
    }

    /// Connect to the daemon
    ///
    /// No-op when already connected; `AlreadyConnecting` when another
    /// connect is in flight. On success the pending queue is flushed in
    /// FIFO order and the attempt counter resets.
    pub async fn connect(&self) -> Result<()> {
        self.connect_inner(false, false).await
    }

    /// Boxed because `watch_events` and `reconnect_loop` lead back here;
    /// the compiler cannot size the recursive opaque future.
    fn connect_inner(&self, announce: bool, from_retry: bool) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            {
                let mut inner = self.shared.inner.lock().await;
                match inner.state {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Connecting => return Err(ClientError::AlreadyConnecting),
                    ConnectionState::Disconnected => inner.state = ConnectionState::Connecting,
                }
            }

            let channel = match self.open_and_probe().await {
                Ok(channel) => channel,
                Err(e) => {
                    self.fail_connect(from_retry).await;
                    return Err(e);
                }
            };

            let channel: Arc<dyn Channel> = Arc::from(channel);
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let setup = async {
                channel.register().await?;
                channel.subscribe(events_tx).await
            };
            if let Err(e) = setup.await {
                self.fail_connect(from_retry).await;
                return Err(e);
            }

            let (pending, generation) = {
                let mut inner = self.shared.inner.lock().await;
                inner.state = ConnectionState::Connected;
                inner.channel = Some(channel.clone());
                inner.attempts = 0;
                inner.generation += 1;
                (std::mem::take(&mut inner.pending), inner.generation)
            };

            tokio::spawn(self.clone().watch_events(generation, events_rx));

            if announce {
                let _ = self.shared.events_tx.send(ClientEvent::DaemonReconnected);
            }
            info!("Connected to daemon, flushing {} queued command(s)", pending.len());

            for command in pending {
                let result = channel.dispatch(command.request).await;
                let _ = command.reply.send(result);
            }
            Ok(())
        })
    }

    /// Roll back a failed attempt. Outside a retry loop nothing will try
    /// again, so the queue is drained as failures; a retry loop keeps it
    /// alive until the budget runs out.
    async fn fail_connect(&self, from_retry: bool) {
        let drained = {
            let mut inner = self.shared.inner.lock().await;
            inner.state = ConnectionState::Disconnected;
            inner.attempts += 1;
            if from_retry {
                VecDeque::new()
            } else {
                std::mem::take(&mut inner.pending)
            }
        };
        for command in drained {
            let _ = command.reply.send(Err(ClientError::NotConnected));
        }
    }

    async fn open_and_probe(&self) -> Result<Box<dyn Channel>> {
        let channel = self.shared.transport.open().await?;
        match tokio::time::timeout(self.shared.config.probe_timeout, channel.ping()).await {
            Ok(Ok(())) => Ok(channel),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ClientError::ProbeTimeout),
        }
    }

    /// Forward daemon events to the embedder; a closed stream from the
    /// current connection means the daemon went away.
    async fn watch_events(self, generation: u64, mut rx: mpsc::UnboundedReceiver<ServiceEvent>) {
        while let Some(event) = rx.recv().await {
            let _ = self.shared.events_tx.send(ClientEvent::Service(event));
        }

        let lost = {
            let mut inner = self.shared.inner.lock().await;
            if inner.generation == generation && inner.state == ConnectionState::Connected {
                inner.state = ConnectionState::Disconnected;
                inner.channel = None;
                true
            } else {
                false
            }
        };
        if lost {
            warn!("Lost connection to daemon, scheduling reconnect");
            tokio::spawn(self.clone().reconnect_loop(true));
        }
    }

    /// Retry connecting with linear backoff up to the configured cap.
    /// `after_loss` delays the first attempt and announces the eventual
    /// reconnect; the call-triggered path tries immediately.
    async fn reconnect_loop(self, after_loss: bool) {
        let config = &self.shared.config;
        for attempt in 1..=config.max_reconnect_attempts {
            if after_loss || attempt > 1 {
                tokio::time::sleep(config.base_retry_delay * attempt).await;
            }
            match self.connect_inner(after_loss, true).await {
                Ok(()) => return,
                // Another connect owns the attempt now
                Err(ClientError::AlreadyConnecting) => return,
                Err(e) => debug!("Connect attempt {attempt} failed: {e}"),
            }
        }

        warn!(
            "Giving up after {} reconnect attempt(s)",
            config.max_reconnect_attempts
        );
        let drained = {
            let mut inner = self.shared.inner.lock().await;
            std::mem::take(&mut inner.pending)
        };
        for command in drained {
            let _ = command.reply.send(Err(ClientError::RetriesExhausted));
        }
        let _ = self.shared.events_tx.send(ClientEvent::DaemonDisconnected);
    }

    /// Unregister and drop the connection without scheduling reconnects
    pub async fn disconnect(&self) {
        let channel = {
            let mut inner = self.shared.inner.lock().await;
            inner.state = ConnectionState::Disconnected;
            inner.generation += 1;
            inner.channel.take()
        };
        if let Some(channel) = channel {
            if let Err(e) = channel.unregister().await {
                debug!("Unregister on disconnect failed: {e}");
            }
        }
    }

    /// Issue one command
    ///
    /// Dispatches immediately when connected; otherwise the command is
    /// queued and a connect is triggered if none is in flight. A bus
    /// failure on a live dispatch counts as liveness loss.
    pub async fn call(&self, request: Request) -> Result<Response> {
        enum Route {
            Live(Arc<dyn Channel>, Request),
            Queued(oneshot::Receiver<Result<Response>>),
        }

        let route = {
            let mut inner = self.shared.inner.lock().await;
            match (inner.state, inner.channel.clone()) {
                (ConnectionState::Connected, Some(channel)) => Route::Live(channel, request),
                _ => {
                    let (reply_tx, reply_rx) = oneshot::channel();
                    let trigger = inner.state == ConnectionState::Disconnected;
                    inner.pending.push_back(PendingCommand {
                        request,
                        reply: reply_tx,
                    });
                    if trigger {
                        tokio::spawn(self.clone().reconnect_loop(false));
                    }
                    Route::Queued(reply_rx)
                }
            }
        };

        match route {
            Route::Live(channel, request) => {
                let result = channel.dispatch(request).await;
                if matches!(result, Err(ClientError::Bus(_))) {
                    self.handle_call_failure().await;
                }
                result
            }
            Route::Queued(reply_rx) => reply_rx.await.map_err(|_| ClientError::NotConnected)?,
        }
    }

    async fn handle_call_failure(&self) {
        let lost = {
            let mut inner = self.shared.inner.lock().await;
            if inner.state == ConnectionState::Connected {
                inner.state = ConnectionState::Disconnected;
                inner.channel = None;
                inner.generation += 1;
                true
            } else {
                false
            }
        };
        if lost {
            warn!("Command failed on a live connection, scheduling reconnect");
            tokio::spawn(self.clone().reconnect_loop(true));
        }
    }

    // Typed wrappers over `call`

    pub async fn initialize_service(&self, config_json: &str) -> Result<(bool, String)> {
        match self
            .call(Request::InitializeService {
                config_json: config_json.to_string(),
            })
            .await?
        {
            Response::Initialized { ok, detail } => Ok((ok, detail)),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_service_status(&self) -> Result<ServiceStatus> {
        match self.call(Request::GetServiceStatus).await? {
            Response::ServiceStatus(status) => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_device_list(&self) -> Result<Vec<Device>> {
        match self.call(Request::GetDeviceList).await? {
            Response::DeviceList(devices) => Ok(devices),
            other => Err(unexpected(other)),
        }
    }

    /// Returns `(is_sent, user_message)`; a refusal is an answer, not
    /// an error
    pub async fn send_multi_files_drop_request(
        &self,
        request: &FileDropRequest,
    ) -> Result<(bool, String)> {
        let request_json = request.to_json().map_err(|e| ClientError::Daemon(e.to_string()))?;
        match self
            .call(Request::SendMultiFilesDropRequest { request_json })
            .await?
        {
            Response::SendResult { is_sent, message } => Ok((is_sent, message)),
            other => Err(unexpected(other)),
        }
    }

    pub async fn cancel_file_transfer(
        &self,
        ip_port: &str,
        client_id: &str,
        timestamp: i64,
    ) -> Result<()> {
        match self
            .call(Request::CancelFileTransfer {
                ip_port: ip_port.to_string(),
                client_id: client_id.to_string(),
                timestamp,
            })
            .await?
        {
            Response::Cancelled => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn update_download_path(&self, path: &str) -> Result<()> {
        match self
            .call(Request::UpdateDownloadPath {
                path: path.to_string(),
            })
            .await?
        {
            Response::DownloadPathUpdated => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: Response) -> ClientError {
    ClientError::Daemon(format!("unexpected reply shape: {response:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    enum Outcome {
        Fail,
        Connect(Arc<FakeChannel>),
    }

    struct FakeTransport {
        script: StdMutex<VecDeque<Outcome>>,
        opens: AtomicU32,
    }

    impl FakeTransport {
        fn scripted(outcomes: Vec<Outcome>) -> Arc<Self> {
            Arc::new(Self {
                script: StdMutex::new(outcomes.into()),
                opens: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn open(&self) -> Result<Box<dyn Channel>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            match self.script.lock().unwrap().pop_front() {
                Some(Outcome::Connect(channel)) => Ok(Box::new(channel)),
                _ => Err(ClientError::Bus(zbus::Error::InvalidReply)),
            }
        }
    }

    /// How the fake answers the liveness probe. The gated modes park the
    /// probe until the test fires the `Notify`, which pins the manager in
    /// `Connecting` for as long as the test needs.
    enum PingMode {
        Ready,
        Hang,
        GateThenReady(Arc<Notify>),
        GateThenFail(Arc<Notify>),
    }

    struct FakeChannel {
        canned: StdMutex<Response>,
        ping: PingMode,
        fail_dispatch: AtomicBool,
        calls: StdMutex<Vec<Request>>,
        registered: AtomicU32,
        subscriber: StdMutex<Option<mpsc::UnboundedSender<ServiceEvent>>>,
    }

    impl FakeChannel {
        fn new() -> Arc<Self> {
            Self::with_canned(Response::Cancelled)
        }

        fn with_canned(response: Response) -> Arc<Self> {
            let channel = Self::with_ping(PingMode::Ready);
            *channel.canned.lock().unwrap() = response;
            channel
        }

        fn with_ping(ping: PingMode) -> Arc<Self> {
            Arc::new(Self {
                canned: StdMutex::new(Response::Cancelled),
                ping,
                fail_dispatch: AtomicBool::new(false),
                calls: StdMutex::new(Vec::new()),
                registered: AtomicU32::new(0),
                subscriber: StdMutex::new(None),
            })
        }

        /// Simulate the daemon going away
        fn drop_event_stream(&self) {
            self.subscriber.lock().unwrap().take();
        }
    }

    #[async_trait]
    impl Channel for Arc<FakeChannel> {
        async fn ping(&self) -> Result<()> {
            match &self.ping {
                PingMode::Ready => Ok(()),
                PingMode::Hang => {
                    futures::future::pending::<()>().await;
                    Ok(())
                }
                PingMode::GateThenReady(gate) => {
                    gate.notified().await;
                    Ok(())
                }
                PingMode::GateThenFail(gate) => {
                    gate.notified().await;
                    Err(ClientError::Bus(zbus::Error::InvalidReply))
                }
            }
        }

        async fn dispatch(&self, request: Request) -> Result<Response> {
            if self.fail_dispatch.load(Ordering::SeqCst) {
                return Err(ClientError::Bus(zbus::Error::InvalidReply));
            }
            self.calls.lock().unwrap().push(request);
            Ok(self.canned.lock().unwrap().clone())
        }

        async fn register(&self) -> Result<()> {
            self.registered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn unregister(&self) -> Result<()> {
            Ok(())
        }

        async fn subscribe(&self, tx: mpsc::UnboundedSender<ServiceEvent>) -> Result<()> {
            *self.subscriber.lock().unwrap() = Some(tx);
            Ok(())
        }
    }

    async fn wait_for_pending(client: &ServiceClient, n: usize) {
        loop {
            if client.shared.inner.lock().await.pending.len() >= n {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    async fn wait_for_state(client: &ServiceClient, state: ConnectionState) {
        loop {
            if client.state().await == state {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_calls_flush_in_fifo_order() {
        // The probe stays gated until both commands sit in the queue, so
        // the flush cannot race the second enqueue
        let gate = Arc::new(Notify::new());
        let channel = FakeChannel::with_ping(PingMode::GateThenReady(gate.clone()));
        let transport = FakeTransport::scripted(vec![Outcome::Connect(channel.clone())]);
        let config = ClientConfig {
            probe_timeout: Duration::from_secs(3600),
            ..ClientConfig::default()
        };
        let (client, _events) = ServiceClient::new(transport, config);

        let first = client.clone();
        let h1 = tokio::spawn(async move { first.call(Request::GetDeviceList).await });
        wait_for_pending(&client, 1).await;

        let second = client.clone();
        let h2 = tokio::spawn(async move { second.call(Request::GetServiceStatus).await });
        wait_for_pending(&client, 2).await;

        gate.notify_one();

        assert!(h1.await.unwrap().is_ok());
        assert!(h2.await.unwrap().is_ok());

        let calls = channel.calls.lock().unwrap();
        assert!(matches!(calls[0], Request::GetDeviceList));
        assert!(matches!(calls[1], Request::GetServiceStatus));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_queued_during_failing_connect_is_drained() {
        let gate = Arc::new(Notify::new());
        let channel = FakeChannel::with_ping(PingMode::GateThenFail(gate.clone()));
        let transport = FakeTransport::scripted(vec![Outcome::Connect(channel)]);
        let config = ClientConfig {
            probe_timeout: Duration::from_secs(3600),
            ..ClientConfig::default()
        };
        let (client, _events) = ServiceClient::new(transport, config);

        let connecting = client.clone();
        let connect_task = tokio::spawn(async move { connecting.connect().await });
        wait_for_state(&client, ConnectionState::Connecting).await;

        // Queued behind the in-flight connect, no retry loop of its own
        let caller = client.clone();
        let call_task = tokio::spawn(async move { caller.call(Request::GetDeviceList).await });
        wait_for_pending(&client, 1).await;

        gate.notify_one();

        assert!(connect_task.await.unwrap().is_err());
        assert!(matches!(
            call_task.await.unwrap(),
            Err(ClientError::NotConnected)
        ));
        assert_eq!(client.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_drains_queue_as_failures() {
        let transport = FakeTransport::scripted(vec![]);
        let config = ClientConfig {
            max_reconnect_attempts: 3,
            ..ClientConfig::default()
        };
        let (client, mut events) = ServiceClient::new(transport.clone(), config);

        let result = client.call(Request::GetDeviceList).await;
        assert!(matches!(result, Err(ClientError::RetriesExhausted)));
        assert!(matches!(
            events.recv().await,
            Some(ClientEvent::DaemonDisconnected)
        ));
        assert_eq!(transport.opens.load(Ordering::SeqCst), 3);
        assert_eq!(client.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_is_noop_when_connected() {
        let channel = FakeChannel::new();
        let transport = FakeTransport::scripted(vec![Outcome::Connect(channel.clone())]);
        let (client, _events) = ServiceClient::new(transport, ClientConfig::default());

        client.connect().await.unwrap();
        client.connect().await.unwrap();

        assert_eq!(channel.registered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connect_while_connecting_is_rejected() {
        let transport = FakeTransport::scripted(vec![]);
        let (client, _events) = ServiceClient::new(transport, ClientConfig::default());

        client.shared.inner.lock().await.state = ConnectionState::Connecting;
        assert!(matches!(
            client.connect().await,
            Err(ClientError::AlreadyConnecting)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout_fails_connect() {
        let transport =
            FakeTransport::scripted(vec![Outcome::Connect(FakeChannel::with_ping(PingMode::Hang))]);
        let (client, _events) = ServiceClient::new(transport, ClientConfig::default());

        assert!(matches!(
            client.connect().await,
            Err(ClientError::ProbeTimeout)
        ));
        assert_eq!(client.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_liveness_loss_reconnects_and_announces() {
        let first = FakeChannel::new();
        let second = FakeChannel::new();
        let transport = FakeTransport::scripted(vec![
            Outcome::Connect(first.clone()),
            Outcome::Connect(second.clone()),
        ]);
        let (client, mut events) = ServiceClient::new(transport, ClientConfig::default());

        client.connect().await.unwrap();
        first.drop_event_stream();

        match events.recv().await.unwrap() {
            ClientEvent::DaemonReconnected => {}
            other => panic!("expected DaemonReconnected, got {other:?}"),
        }
        assert_eq!(client.state().await, ConnectionState::Connected);
        assert_eq!(client.shared.inner.lock().await.attempts, 0);
        assert_eq!(second.registered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_counter_resets_on_success() {
        let channel = FakeChannel::new();
        let transport = FakeTransport::scripted(vec![
            Outcome::Fail,
            Outcome::Fail,
            Outcome::Connect(channel),
        ]);
        let (client, _events) = ServiceClient::new(transport, ClientConfig::default());

        assert!(client.call(Request::GetDeviceList).await.is_ok());
        assert_eq!(client.shared.inner.lock().await.attempts, 0);
    }

    #[tokio::test]
    async fn test_daemon_events_reach_the_embedder() {
        let channel = FakeChannel::new();
        let transport = FakeTransport::scripted(vec![Outcome::Connect(channel.clone())]);
        let (client, mut events) = ServiceClient::new(transport, ClientConfig::default());

        client.connect().await.unwrap();
        channel
            .subscriber
            .lock()
            .unwrap()
            .as_ref()
            .unwrap()
            .send(ServiceEvent::AuthRequested { auth_index: 7 })
            .unwrap();

        match events.recv().await.unwrap() {
            ClientEvent::Service(ServiceEvent::AuthRequested { auth_index }) => {
                assert_eq!(auth_index, 7);
            }
            other => panic!("expected forwarded auth event, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_failure_counts_as_liveness_loss() {
        let channel = FakeChannel::new();
        let transport = FakeTransport::scripted(vec![Outcome::Connect(channel.clone())]);
        let (client, mut events) = ServiceClient::new(transport, ClientConfig::default());

        client.connect().await.unwrap();
        channel.fail_dispatch.store(true, Ordering::SeqCst);

        let result = client.call(Request::GetDeviceList).await;
        assert!(matches!(result, Err(ClientError::Bus(_))));

        // Reconnect budget runs against an exhausted script
        assert!(matches!(
            events.recv().await,
            Some(ClientEvent::DaemonDisconnected)
        ));
        assert_eq!(client.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_get_device_list_returns_typed_devices() {
        let device = Device {
            id: "d1".into(),
            ip_addr: "192.168.1.20:4411".into(),
            status: nearshare_core::DEVICE_ONLINE,
            platform: "macos".into(),
            device_name: "Mac".into(),
            source_port_type: "lan".into(),
            version: "1.0".into(),
            time_stamp: 1000,
        };
        let channel = FakeChannel::with_canned(Response::DeviceList(vec![device]));
        let transport = FakeTransport::scripted(vec![Outcome::Connect(channel)]);
        let (client, _events) = ServiceClient::new(transport, ClientConfig::default());

        client.connect().await.unwrap();
        let devices = client.get_device_list().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device_name, "Mac");
    }
}
