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

//! Error types for the serial link.

use thiserror::Error;

/// Errors raised by the serial service and its radio backend.
///
/// Variants carry rendered messages rather than sources so the error can be
/// cloned into listener events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerialError {
    #[error("Bluetooth is not supported on this hardware")]
    RadioUnavailable,

    #[error("Bluetooth adapter is turned off")]
    RadioDisabled,

    #[error("invalid Bluetooth address: {0}")]
    InvalidAddress(String),

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("failed to create a socket: {0}")]
    SocketCreationFailed(String),

    #[error("failed to connect to the socket: {0}")]
    ConnectionEstablishFailed(String),

    #[error("stream read failed: {0}")]
    StreamReadFailed(String),

    #[error("stream write failed: {0}")]
    StreamWriteFailed(String),

    #[error("BlueZ error: {0}")]
    Bluez(String),
}

pub type Result<T> = std::result::Result<T, SerialError>;
