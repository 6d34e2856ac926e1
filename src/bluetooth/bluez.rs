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

//! BlueZ radio backend.

use bluer::rfcomm::{Security, SecurityLevel, Socket, SocketAddr};
use bluer::{Adapter, Address, Session};
use futures::future::BoxFuture;
use std::io;
use std::str::FromStr;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::transport::{
    is_valid_address, ChannelMode, DeviceHandle, RadioAdapter, RadioStatus, SerialStream,
    SocketDescriptor, SPP_UUID,
};
use crate::error::{Result, SerialError};

/// Radio backed by the default BlueZ adapter.
pub struct BluezAdapter {
    // Keeps the D-Bus connection alive for the adapter proxy.
    _session: Option<Session>,
    adapter: Option<Adapter>,
    channel: u8,
}

impl BluezAdapter {
    /// Open a BlueZ session and pick the default adapter.
    ///
    /// A missing daemon or adapter is not an error here; it is reported as
    /// [`RadioStatus::NotSupported`] by [`RadioAdapter::status`].
    pub async fn new(channel: u8) -> Self {
        let session = match Session::new().await {
            Ok(session) => session,
            Err(e) => {
                warn!("Failed to open BlueZ session: {}", e);
                return Self {
                    _session: None,
                    adapter: None,
                    channel,
                };
            }
        };
        debug!("BlueZ session created");

        let adapter = match session.default_adapter().await {
            Ok(adapter) => {
                info!("Using Bluetooth adapter: {}", adapter.name());
                Some(adapter)
            }
            Err(e) => {
                warn!("No Bluetooth adapter: {}", e);
                None
            }
        };

        Self {
            _session: Some(session),
            adapter,
            channel,
        }
    }

    /// Name and address of the local adapter.
    pub async fn local_adapter(&self) -> Option<(String, Address)> {
        let adapter = self.adapter.as_ref()?;
        let address = adapter.address().await.ok()?;
        Some((adapter.name().to_string(), address))
    }

    fn adapter(&self) -> Result<&Adapter> {
        self.adapter.as_ref().ok_or(SerialError::RadioUnavailable)
    }
}

fn parse_address(address: &str) -> Result<Address> {
    if !is_valid_address(address) {
        return Err(SerialError::InvalidAddress(address.to_string()));
    }
    Address::from_str(address).map_err(|_| SerialError::InvalidAddress(address.to_string()))
}

impl RadioAdapter for BluezAdapter {
    fn status(&self) -> BoxFuture<'_, RadioStatus> {
        Box::pin(async move {
            let Some(adapter) = self.adapter.as_ref() else {
                return RadioStatus::NotSupported;
            };
            match adapter.is_powered().await {
                Ok(true) => RadioStatus::Enabled,
                Ok(false) => RadioStatus::Disabled,
                Err(e) => {
                    warn!("Failed to query adapter power state: {}", e);
                    RadioStatus::NotSupported
                }
            }
        })
    }

    fn resolve<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<DeviceHandle>> {
        Box::pin(async move {
            let addr = parse_address(address)?;
            let device = self
                .adapter()?
                .device(addr)
                .map_err(|e| SerialError::Bluez(e.to_string()))?;

            let name = device
                .alias()
                .await
                .map_err(|_| SerialError::DeviceNotFound(address.to_string()))?;

            match device.uuids().await {
                Ok(Some(uuids)) if !uuids.contains(&SPP_UUID) => {
                    warn!("{} does not advertise the serial port service", name);
                }
                _ => {}
            }

            Ok(DeviceHandle::new(name, addr.to_string()))
        })
    }

    fn create_socket(
        &self,
        device: &DeviceHandle,
        mode: ChannelMode,
        service: Uuid,
    ) -> Result<Box<dyn SocketDescriptor>> {
        let addr = parse_address(&device.address)?;
        let level = match mode {
            ChannelMode::Secure => SecurityLevel::Medium,
            ChannelMode::Insecure => SecurityLevel::Low,
        };

        let socket =
            Socket::new().map_err(|e| SerialError::SocketCreationFailed(e.to_string()))?;
        socket
            .set_security(Security { level, key_size: 0 })
            .map_err(|e| SerialError::SocketCreationFailed(e.to_string()))?;

        debug!(
            "Created {:?} RFCOMM socket for service {} on channel {}",
            mode, service, self.channel
        );

        Ok(Box::new(RfcommSocket {
            socket,
            target: SocketAddr::new(addr, self.channel),
        }))
    }
}

/// Unconnected RFCOMM socket.
struct RfcommSocket {
    socket: Socket,
    target: SocketAddr,
}

impl SocketDescriptor for RfcommSocket {
    fn connect(self: Box<Self>) -> BoxFuture<'static, io::Result<Box<dyn SerialStream>>> {
        let RfcommSocket { socket, target } = *self;
        Box::pin(async move {
            let stream = socket.connect(target).await?;
            Ok(Box::new(stream) as Box<dyn SerialStream>)
        })
    }
}
