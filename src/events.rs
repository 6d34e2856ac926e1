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

//! Listener contract and event dispatch.
//!
//! The service never calls its listener directly. Everything it has to report
//! is queued as a [`SerialEvent`] and delivered in order by a single
//! dispatcher task.

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::SerialError;
use crate::state::ConnectionState;

/// Events produced by the serial service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialEvent {
    /// No radio on this machine.
    RadioNotSupported,
    /// Radio present but turned off.
    RadioDisabled,
    /// Connection state changed (or was re-announced).
    StateChanged(ConnectionState),
    /// A device connected. Always precedes `StateChanged(Connected)`.
    DeviceConnected { name: String, address: String },
    /// Bytes read from the remote device.
    DataRead(Vec<u8>),
    /// Bytes written to the remote device.
    DataWritten(Vec<u8>),
    /// A failure that was folded into the reset policy or swallowed.
    Error(SerialError),
}

/// Receiver of serial link notifications.
///
/// Callbacks run on the dispatcher task, one at a time.
pub trait SerialListener: Send + 'static {
    /// Bluetooth adapter is not present on this device.
    fn on_radio_not_supported(&mut self);

    /// This device's Bluetooth adapter is turned off.
    fn on_radio_disabled(&mut self);

    fn on_state_changed(&mut self, state: ConnectionState);

    /// Connected to a remote device.
    fn on_device_connected(&mut self, name: &str, address: &str);

    /// Data read from the serial port, decoded as lossy UTF-8.
    fn on_serial_read(&mut self, message: &str);

    /// Data written to the serial port, decoded as lossy UTF-8.
    fn on_serial_write(&mut self, message: &str);

    fn on_error(&mut self, _error: &SerialError) {}

    /// Whether the raw byte callbacks should be invoked as well.
    ///
    /// Queried once when the dispatcher is created.
    fn accepts_raw(&self) -> bool {
        false
    }

    fn on_serial_read_raw(&mut self, _bytes: &[u8]) {}

    fn on_serial_write_raw(&mut self, _bytes: &[u8]) {}
}

/// Delivers queued events to a listener.
pub struct EventDispatcher {
    listener: Box<dyn SerialListener>,
    raw: bool,
}

impl EventDispatcher {
    pub fn new(listener: Box<dyn SerialListener>) -> Self {
        let raw = listener.accepts_raw();
        Self { listener, raw }
    }

    /// Deliver a single event.
    pub fn dispatch(&mut self, event: SerialEvent) {
        match event {
            SerialEvent::RadioNotSupported => self.listener.on_radio_not_supported(),
            SerialEvent::RadioDisabled => self.listener.on_radio_disabled(),
            SerialEvent::StateChanged(state) => self.listener.on_state_changed(state),
            SerialEvent::DeviceConnected { name, address } => {
                self.listener.on_device_connected(&name, &address)
            }
            SerialEvent::DataRead(bytes) => {
                self.listener
                    .on_serial_read(&String::from_utf8_lossy(&bytes));
                if self.raw {
                    self.listener.on_serial_read_raw(&bytes);
                }
            }
            SerialEvent::DataWritten(bytes) => {
                self.listener
                    .on_serial_write(&String::from_utf8_lossy(&bytes));
                if self.raw {
                    self.listener.on_serial_write_raw(&bytes);
                }
            }
            SerialEvent::Error(e) => self.listener.on_error(&e),
        }
    }

    /// Drain the queue until every sender is gone.
    pub async fn run(mut self, mut event_rx: mpsc::UnboundedReceiver<SerialEvent>) {
        debug!("Event dispatcher started");
        while let Some(event) = event_rx.recv().await {
            self.dispatch(event);
        }
        info!("Event dispatcher stopped");
    }
}

/// Listener that forwards every notification into a channel.
///
/// Data events carry the raw bytes; the text callbacks are not forwarded.
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<SerialEvent>,
}

impl ChannelListener {
    pub fn new(tx: mpsc::UnboundedSender<SerialEvent>) -> Self {
        Self { tx }
    }

    /// Create a listener together with the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SerialEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn forward(&self, event: SerialEvent) {
        // Receiver gone means nobody is listening anymore.
        let _ = self.tx.send(event);
    }
}

impl SerialListener for ChannelListener {
    fn on_radio_not_supported(&mut self) {
        self.forward(SerialEvent::RadioNotSupported);
    }

    fn on_radio_disabled(&mut self) {
        self.forward(SerialEvent::RadioDisabled);
    }

    fn on_state_changed(&mut self, state: ConnectionState) {
        self.forward(SerialEvent::StateChanged(state));
    }

    fn on_device_connected(&mut self, name: &str, address: &str) {
        self.forward(SerialEvent::DeviceConnected {
            name: name.to_string(),
            address: address.to_string(),
        });
    }

    fn on_serial_read(&mut self, _message: &str) {}

    fn on_serial_write(&mut self, _message: &str) {}

    fn on_error(&mut self, error: &SerialError) {
        self.forward(SerialEvent::Error(error.clone()));
    }

    fn accepts_raw(&self) -> bool {
        true
    }

    fn on_serial_read_raw(&mut self, bytes: &[u8]) {
        self.forward(SerialEvent::DataRead(bytes.to_vec()));
    }

    fn on_serial_write_raw(&mut self, bytes: &[u8]) {
        self.forward(SerialEvent::DataWritten(bytes.to_vec()));
    }
}
