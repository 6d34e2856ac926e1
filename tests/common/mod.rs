//! In-memory radio used by the integration tests.

#![allow(dead_code)]

use blueserial::bluetooth::{ChannelMode, SerialStream, SocketDescriptor};
use blueserial::{
    ChannelListener, ConnectionState, DeviceHandle, RadioAdapter, RadioStatus, SerialError,
    SerialEvent, SerialService, ServiceConfig,
};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{duplex, AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use uuid::Uuid;

pub const WAIT: Duration = Duration::from_secs(2);
pub const QUIET: Duration = Duration::from_millis(100);

/// How a socket created by [`MockRadio`] behaves on connect.
pub enum Plan {
    Connect,
    Fail,
    Hang,
    /// Connect once the sender fires.
    Gated(oneshot::Receiver<()>),
    /// Connect to a stream that reads normally but rejects every write.
    WriteFails,
}

/// Far end of a connected socket.
pub struct Peer {
    pub address: String,
    pub stream: DuplexStream,
}

pub struct MockRadio {
    status: RadioStatus,
    devices: HashMap<String, String>,
    plans: Mutex<HashMap<String, VecDeque<Plan>>>,
    refused: Mutex<Vec<ChannelMode>>,
    created: Mutex<Vec<(String, ChannelMode)>>,
    released: Arc<AtomicUsize>,
    peer_tx: mpsc::UnboundedSender<Peer>,
}

impl MockRadio {
    pub fn new(status: RadioStatus) -> (Self, mpsc::UnboundedReceiver<Peer>) {
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let mut devices = HashMap::new();
        devices.insert("11:22:33:44:55:66".to_string(), "HC-05".to_string());
        devices.insert("66:55:44:33:22:11".to_string(), "HC-06".to_string());
        (
            Self {
                status,
                devices,
                plans: Mutex::new(HashMap::new()),
                refused: Mutex::new(Vec::new()),
                created: Mutex::new(Vec::new()),
                released: Arc::new(AtomicUsize::new(0)),
                peer_tx,
            },
            peer_rx,
        )
    }

    /// Queue a connect behavior for the next socket to `address`.
    pub fn plan(&self, address: &str, plan: Plan) {
        self.plans
            .lock()
            .entry(address.to_string())
            .or_default()
            .push_back(plan);
    }

    pub fn refuse(&self, mode: ChannelMode) {
        self.refused.lock().push(mode);
    }

    pub fn created(&self) -> Vec<(String, ChannelMode)> {
        self.created.lock().clone()
    }

    /// Number of socket descriptors that have been dropped.
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl RadioAdapter for MockRadio {
    fn status(&self) -> BoxFuture<'_, RadioStatus> {
        let status = self.status;
        Box::pin(async move { status })
    }

    fn resolve<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<DeviceHandle, SerialError>> {
        Box::pin(async move {
            if !blueserial::bluetooth::is_valid_address(address) {
                return Err(SerialError::InvalidAddress(address.to_string()));
            }
            self.devices
                .get(address)
                .map(|name| DeviceHandle::new(name.clone(), address))
                .ok_or_else(|| SerialError::DeviceNotFound(address.to_string()))
        })
    }

    fn create_socket(
        &self,
        device: &DeviceHandle,
        mode: ChannelMode,
        service: Uuid,
    ) -> Result<Box<dyn SocketDescriptor>, SerialError> {
        assert_eq!(service, blueserial::bluetooth::SPP_UUID);
        self.created.lock().push((device.address.clone(), mode));
        if self.refused.lock().contains(&mode) {
            return Err(SerialError::SocketCreationFailed(format!("{:?} refused", mode)));
        }

        let plan = self
            .plans
            .lock()
            .get_mut(&device.address)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(Plan::Connect);

        Ok(Box::new(MockSocket {
            address: device.address.clone(),
            plan,
            peer_tx: self.peer_tx.clone(),
            _release: ReleaseGuard(self.released.clone()),
        }))
    }
}

struct ReleaseGuard(Arc<AtomicUsize>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockSocket {
    address: String,
    plan: Plan,
    peer_tx: mpsc::UnboundedSender<Peer>,
    _release: ReleaseGuard,
}

impl MockSocket {
    fn open(self) -> io::Result<Box<dyn SerialStream>> {
        Ok(Box::new(self.open_duplex()))
    }

    fn open_duplex(self) -> DuplexStream {
        let (near, far) = duplex(4096);
        let _ = self.peer_tx.send(Peer {
            address: self.address,
            stream: far,
        });
        near
    }
}

/// Stream whose read side works and whose write side is broken.
struct BrokenWrites(DuplexStream);

impl AsyncRead for BrokenWrites {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl AsyncWrite for BrokenWrites {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "write side down")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl SocketDescriptor for MockSocket {
    fn connect(self: Box<Self>) -> BoxFuture<'static, io::Result<Box<dyn SerialStream>>> {
        let mut socket = *self;
        Box::pin(async move {
            match std::mem::replace(&mut socket.plan, Plan::Connect) {
                Plan::Connect => socket.open(),
                Plan::Fail => Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "host is down",
                )),
                Plan::Hang => futures::future::pending().await,
                Plan::Gated(gate) => {
                    let _ = gate.await;
                    socket.open()
                }
                Plan::WriteFails => {
                    let stream: Box<dyn SerialStream> = Box::new(BrokenWrites(socket.open_duplex()));
                    Ok(stream)
                }
            }
        })
    }
}

/// A service wired to a [`MockRadio`], with its event and peer streams.
pub struct Harness {
    pub service: SerialService,
    pub radio: Arc<MockRadio>,
    pub events: mpsc::UnboundedReceiver<SerialEvent>,
    pub peers: mpsc::UnboundedReceiver<Peer>,
}

impl Harness {
    pub fn new(status: RadioStatus) -> Self {
        let (radio, peers) = MockRadio::new(status);
        let radio = Arc::new(radio);
        let (listener, events) = ChannelListener::channel();
        let service = SerialService::new(
            radio.clone(),
            Box::new(listener),
            ServiceConfig { read_buffer_size: 16 },
        );
        Self {
            service,
            radio,
            events,
            peers,
        }
    }

    /// Set up and start a service with an enabled radio.
    pub async fn ready() -> Self {
        let mut harness = Self::new(RadioStatus::Enabled);
        assert!(harness.service.setup().await);
        harness.service.start();
        harness
            .expect(SerialEvent::StateChanged(ConnectionState::Disconnected))
            .await;
        harness
    }

    pub async fn next_event(&mut self) -> SerialEvent {
        timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed")
    }

    pub async fn expect(&mut self, expected: SerialEvent) {
        assert_eq!(self.next_event().await, expected);
    }

    /// Assert that no event arrives for a short while.
    pub async fn expect_quiet(&mut self) {
        if let Ok(Some(event)) = timeout(QUIET, self.events.recv()).await {
            panic!("unexpected event: {:?}", event);
        }
    }

    pub async fn next_peer(&mut self) -> Peer {
        timeout(WAIT, self.peers.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("peer channel closed")
    }

    /// Connect to `address` and consume the events of a successful connection.
    pub async fn connect(&mut self, address: &str) -> Peer {
        self.service.connect_address(address).await;
        self.expect(SerialEvent::StateChanged(ConnectionState::Connecting))
            .await;
        match self.next_event().await {
            SerialEvent::DeviceConnected { address: got, .. } => assert_eq!(got, address),
            other => panic!("expected device info, got {:?}", other),
        }
        self.expect(SerialEvent::StateChanged(ConnectionState::Connected))
            .await;
        self.next_peer().await
    }

    /// Wait until the radio reports `count` released descriptors.
    pub async fn wait_released(&self, count: usize) {
        timeout(WAIT, async {
            while self.radio.released() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("socket was not released");
    }
}

/// Check that state and live operations agree.
pub fn assert_consistent(service: &SerialService) {
    let snapshot = service.snapshot();
    match snapshot.state {
        ConnectionState::Disconnected => {
            assert!(!snapshot.connecting && !snapshot.pumping, "{:?}", snapshot)
        }
        ConnectionState::Connecting => {
            assert!(snapshot.connecting && !snapshot.pumping, "{:?}", snapshot)
        }
        ConnectionState::Connected => {
            assert!(!snapshot.connecting && snapshot.pumping, "{:?}", snapshot)
        }
    }
}
