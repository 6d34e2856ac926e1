// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Serial Port Profile service.
//!
//! [`SerialService`] owns the connection state and at most one connect
//! operation and one data pump. Every transition happens under a single lock;
//! reports from background operations are routed back through the service
//! and dropped when their generation is no longer current.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::connect;
use super::operation::{Generation, OperationHandle, OperationReport};
use super::pump::DataPump;
use super::transport::{DeviceHandle, RadioAdapter, RadioStatus};
use crate::events::{EventDispatcher, SerialEvent, SerialListener};
use crate::state::{ConnectedDevice, ConnectionState};

const CRLF: &[u8] = b"\r\n";

/// Tunables for the serial service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Capacity of the read buffer used by the data pump.
    pub read_buffer_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 1024,
        }
    }
}

/// Consistent view of the service, taken under its lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSnapshot {
    pub state: ConnectionState,
    pub connecting: bool,
    pub pumping: bool,
    pub device: Option<ConnectedDevice>,
}

struct Inner {
    ready: bool,
    state: ConnectionState,
    connect_op: Option<OperationHandle>,
    pump: Option<DataPump>,
    device: Option<ConnectedDevice>,
    next_generation: Generation,
}

impl Inner {
    fn issue_generation(&mut self) -> Generation {
        self.next_generation += 1;
        self.next_generation
    }

    fn reset_connect_op(&mut self) {
        if let Some(mut op) = self.connect_op.take() {
            debug!("Cancelling connect operation #{}", op.generation());
            op.cancel();
        }
    }

    fn reset_pump(&mut self) {
        if let Some(pump) = self.pump.take() {
            debug!("Cancelling data pump #{}", pump.generation());
        }
        self.device = None;
    }

    fn reset_operations(&mut self) {
        self.reset_connect_op();
        self.reset_pump();
    }
}

struct Shared {
    inner: Mutex<Inner>,
    radio: Arc<dyn RadioAdapter>,
    config: ServiceConfig,
    runtime: Handle,
    event_tx: mpsc::UnboundedSender<SerialEvent>,
    report_tx: mpsc::UnboundedSender<OperationReport>,
}

impl Shared {
    fn emit(&self, event: SerialEvent) {
        // Dispatcher outlives the service, so this only fails during runtime shutdown.
        let _ = self.event_tx.send(event);
    }

    /// Set the state and announce it, even when unchanged.
    fn set_state(&self, inner: &mut Inner, state: ConnectionState) {
        debug!("setState() {:?} -> {:?}", inner.state, state);
        inner.state = state;
        self.emit(SerialEvent::StateChanged(state));
    }

    /// Drop every operation and fall back to a ready, disconnected state.
    fn reset(&self, inner: &mut Inner) {
        inner.reset_operations();
        self.set_state(inner, ConnectionState::Disconnected);
    }

    fn handle_report(&self, report: OperationReport) {
        let mut inner = self.inner.lock();
        let generation = report.generation();

        match report {
            OperationReport::Connected { stream, device, .. } => {
                if !is_current_connect(&inner, generation) {
                    debug!("Discarding stale connection #{} to {}", generation, device);
                    return;
                }
                info!("Connected to {}!", device);

                inner.reset_operations();
                let pump_generation = inner.issue_generation();
                inner.pump = Some(DataPump::spawn(
                    &self.runtime,
                    pump_generation,
                    stream,
                    self.config.read_buffer_size,
                    self.report_tx.clone(),
                ));
                inner.device = Some(ConnectedDevice {
                    name: device.name.clone(),
                    address: device.address.clone(),
                });

                self.emit(SerialEvent::DeviceConnected {
                    name: device.name,
                    address: device.address,
                });
                self.set_state(&mut inner, ConnectionState::Connected);
            }
            OperationReport::ConnectFailed { error, .. } => {
                if !is_current_connect(&inner, generation) {
                    debug!("Discarding stale connect failure #{}", generation);
                    return;
                }
                warn!("Connection failed: {}", error);
                inner.connect_op = None;
                self.emit(SerialEvent::Error(error));
                self.reset(&mut inner);
            }
            OperationReport::Received { bytes, .. } => {
                if is_current_pump(&inner, generation) {
                    self.emit(SerialEvent::DataRead(bytes));
                }
            }
            OperationReport::Broken { error, .. } => {
                if !is_current_pump(&inner, generation) {
                    debug!("Discarding stale pump failure #{}", generation);
                    return;
                }
                warn!("Connection lost: {}", error);
                self.emit(SerialEvent::Error(error));
                self.reset(&mut inner);
            }
        }
    }
}

fn is_current_connect(inner: &Inner, generation: Generation) -> bool {
    inner
        .connect_op
        .as_ref()
        .is_some_and(|op| op.generation() == generation)
}

fn is_current_pump(inner: &Inner, generation: Generation) -> bool {
    inner
        .pump
        .as_ref()
        .is_some_and(|pump| pump.generation() == generation)
}

/// Route operation reports into the service until it is dropped.
async fn supervise(shared: Weak<Shared>, mut report_rx: mpsc::UnboundedReceiver<OperationReport>) {
    while let Some(report) = report_rx.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.handle_report(report);
    }
    debug!("Report supervisor stopped");
}

/// Serial Port Profile connection service.
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct SerialService {
    shared: Arc<Shared>,
}

impl SerialService {
    /// Create a service delivering notifications to `listener`.
    ///
    /// Must be called from within a tokio runtime; background work is spawned
    /// on that runtime.
    pub fn new(
        radio: Arc<dyn RadioAdapter>,
        listener: Box<dyn SerialListener>,
        config: ServiceConfig,
    ) -> Self {
        let runtime = Handle::current();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (report_tx, report_rx) = mpsc::unbounded_channel();

        runtime.spawn(EventDispatcher::new(listener).run(event_rx));

        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                ready: false,
                state: ConnectionState::Disconnected,
                connect_op: None,
                pump: None,
                device: None,
                next_generation: 0,
            }),
            radio,
            config,
            runtime: runtime.clone(),
            event_tx,
            report_tx,
        });

        runtime.spawn(supervise(Arc::downgrade(&shared), report_rx));

        Self { shared }
    }

    /// Check the radio and get the service ready to connect.
    ///
    /// Returns false, after notifying the listener, when no usable radio is
    /// present. The service then ignores every other call.
    pub async fn setup(&self) -> bool {
        match self.shared.radio.status().await {
            RadioStatus::NotSupported => {
                warn!("Bluetooth is not supported on this device");
                self.shared.emit(SerialEvent::RadioNotSupported);
                false
            }
            RadioStatus::Disabled => {
                warn!("Bluetooth adapter is turned off");
                self.shared.emit(SerialEvent::RadioDisabled);
                false
            }
            RadioStatus::Enabled => {
                self.shared.inner.lock().ready = true;
                info!("Serial service ready");
                true
            }
        }
    }

    /// Whether the radio is currently present and powered.
    pub async fn is_radio_enabled(&self) -> bool {
        self.shared.radio.status().await == RadioStatus::Enabled
    }

    /// Whether [`setup`](Self::setup) found a usable radio.
    pub fn is_setup(&self) -> bool {
        self.shared.inner.lock().ready
    }

    /// Reset to a clean disconnected state, ready for [`connect`](Self::connect).
    ///
    /// Only acts while disconnected. Re-announces the state so listeners start
    /// from a known baseline.
    pub fn start(&self) {
        let mut inner = self.shared.inner.lock();
        if !inner.ready || inner.state != ConnectionState::Disconnected {
            return;
        }
        debug!("start()");
        self.shared.reset(&mut inner);
    }

    /// Connect to the device with the given address.
    ///
    /// Addresses that cannot be resolved are logged and ignored.
    pub async fn connect_address(&self, address: &str) {
        if !self.is_setup() {
            return;
        }
        match self.shared.radio.resolve(address).await {
            Ok(device) => self.connect(device),
            Err(e) => warn!("Device not found: {}", e),
        }
    }

    /// Connect to `device`, preempting any attempt or connection in progress.
    pub fn connect(&self, device: DeviceHandle) {
        let mut inner = self.shared.inner.lock();
        if !inner.ready {
            warn!("connect() before setup, ignoring");
            return;
        }
        debug!("connect({})", device);

        inner.reset_connect_op();
        if inner.state == ConnectionState::Connected {
            inner.reset_pump();
        }

        let generation = inner.issue_generation();
        inner.connect_op = Some(connect::spawn(
            &self.shared.runtime,
            generation,
            device,
            self.shared.radio.clone(),
            self.shared.report_tx.clone(),
        ));
        self.shared.set_state(&mut inner, ConnectionState::Connecting);
    }

    /// Write bytes to the connected device.
    ///
    /// Silently dropped unless connected. Fires an outbound data event once
    /// the bytes are written; a failed write is reported through
    /// [`SerialListener::on_error`] and leaves the connection alone. Writes
    /// still pending when the connection goes away report nothing.
    pub async fn write(&self, data: &[u8]) {
        let writer = {
            let inner = self.shared.inner.lock();
            match (&inner.state, &inner.pump) {
                (ConnectionState::Connected, Some(pump)) => pump.writer(),
                _ => return,
            }
        };

        let result = writer.write(data).await;

        // The pump may have been replaced or stopped while the write was pending.
        let inner = self.shared.inner.lock();
        if !is_current_pump(&inner, writer.generation()) {
            debug!("Dropping result of write on stale pump #{}", writer.generation());
            return;
        }
        match result {
            Ok(()) => {
                debug!("Wrote {} bytes", data.len());
                self.shared.emit(SerialEvent::DataWritten(data.to_vec()));
            }
            Err(e) => {
                warn!("Unable to write the socket: {}", e);
                self.shared.emit(SerialEvent::Error(e));
            }
        }
    }

    /// Write a string, optionally followed by a separate CRLF write.
    pub async fn write_str(&self, data: &str, crlf: bool) {
        self.write(data.as_bytes()).await;
        if crlf {
            self.write(CRLF).await;
        }
    }

    /// Write a string followed by CRLF.
    pub async fn writeln(&self, data: &str) {
        self.write_str(data, true).await;
    }

    /// Disconnect and release every background operation.
    pub fn stop(&self) {
        let mut inner = self.shared.inner.lock();
        if !inner.ready {
            return;
        }
        debug!("stop()");
        self.shared.reset(&mut inner);
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Name and address of the connected device, if any.
    pub fn connected_device(&self) -> Option<ConnectedDevice> {
        self.shared.inner.lock().device.clone()
    }

    pub fn snapshot(&self) -> ServiceSnapshot {
        let inner = self.shared.inner.lock();
        ServiceSnapshot {
            state: inner.state,
            connecting: inner.connect_op.is_some(),
            pumping: inner.pump.is_some(),
            device: inner.device.clone(),
        }
    }
}

impl std::fmt::Debug for SerialService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialService")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}
