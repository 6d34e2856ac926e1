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

//! Contract between the serial service and the platform radio stack.

use futures::future::BoxFuture;
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

use crate::error::Result;

/// Serial Port Profile service UUID.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// An open bidirectional byte stream. Dropping it closes the link.
pub trait SerialStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> SerialStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// A socket that has been created for a device but not yet connected.
pub trait SocketDescriptor: Send + 'static {
    /// Establish the link. Blocks until the transport connects or fails.
    fn connect(self: Box<Self>) -> BoxFuture<'static, io::Result<Box<dyn SerialStream>>>;
}

/// Security mode requested when creating a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    /// Authenticated and encrypted link.
    Secure,
    /// Unauthenticated link.
    Insecure,
}

/// Radio availability on this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioStatus {
    NotSupported,
    Disabled,
    Enabled,
}

/// A remote device resolved by the radio stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    pub id: String,
    pub name: String,
    pub address: String,
}

impl DeviceHandle {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            id: format!("bt-{}", address.replace(':', "").to_lowercase()),
            name: name.into(),
            address,
        }
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// Capabilities the serial service consumes from the radio stack.
pub trait RadioAdapter: Send + Sync + 'static {
    /// Report whether a radio is present and powered.
    fn status(&self) -> BoxFuture<'_, RadioStatus>;

    /// Resolve a textual address to a device.
    fn resolve<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<DeviceHandle>>;

    /// Create an unconnected socket to `service` on `device`.
    fn create_socket(
        &self,
        device: &DeviceHandle,
        mode: ChannelMode,
        service: Uuid,
    ) -> Result<Box<dyn SocketDescriptor>>;
}

/// Check that a string is a colon separated 48-bit address.
pub fn is_valid_address(address: &str) -> bool {
    let parts: Vec<&str> = address.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
}
