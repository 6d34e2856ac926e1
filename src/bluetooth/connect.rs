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

//! Background attempt to open a serial socket to one device.

use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::operation::{CancelToken, Generation, OperationHandle, OperationReport};
use super::transport::{ChannelMode, DeviceHandle, RadioAdapter, SocketDescriptor, SPP_UUID};
use crate::error::{Result, SerialError};

/// Create a socket, preferring a secure channel.
///
/// Falls back to an insecure channel only when the secure socket cannot be
/// created at all.
pub(crate) fn open_socket(
    radio: &dyn RadioAdapter,
    device: &DeviceHandle,
) -> Result<Box<dyn SocketDescriptor>> {
    match radio.create_socket(device, ChannelMode::Secure, SPP_UUID) {
        Ok(socket) => Ok(socket),
        Err(e) => {
            warn!("Failed to create a secure socket: {}", e);
            radio
                .create_socket(device, ChannelMode::Insecure, SPP_UUID)
                .map_err(|e| {
                    error!("Failed to create an insecure socket: {}", e);
                    SerialError::SocketCreationFailed(e.to_string())
                })
        }
    }
}

/// Start connecting to `device` on the given runtime.
pub(crate) fn spawn(
    runtime: &Handle,
    generation: Generation,
    device: DeviceHandle,
    radio: Arc<dyn RadioAdapter>,
    reports: mpsc::UnboundedSender<OperationReport>,
) -> OperationHandle {
    debug!("Connect operation #{} for {}", generation, device);
    let (handle, cancel) = OperationHandle::new(generation);
    runtime.spawn(run(generation, device, radio, reports, cancel));
    handle
}

async fn run(
    generation: Generation,
    device: DeviceHandle,
    radio: Arc<dyn RadioAdapter>,
    reports: mpsc::UnboundedSender<OperationReport>,
    mut cancel: CancelToken,
) {
    let socket = match open_socket(radio.as_ref(), &device) {
        Ok(socket) => socket,
        Err(error) => {
            let _ = reports.send(OperationReport::ConnectFailed { generation, error });
            return;
        }
    };

    // Losing the race to `cancel` drops the pending connect, which closes the socket.
    let report = tokio::select! {
        _ = cancel.cancelled() => {
            debug!("Connect operation #{} cancelled", generation);
            return;
        }
        result = socket.connect() => match result {
            Ok(stream) => {
                info!("Socket connected to {}", device);
                OperationReport::Connected { generation, stream, device }
            }
            Err(e) => {
                error!("Failed to connect to the socket: {}", e);
                OperationReport::ConnectFailed {
                    generation,
                    error: SerialError::ConnectionEstablishFailed(e.to_string()),
                }
            }
        },
    };

    if reports.send(report).is_err() {
        debug!("Service gone, dropping result of connect operation #{}", generation);
    }
}
