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

//! Bluetooth serial module.
//!
//! Connects to a remote device over RFCOMM using the Serial Port Profile and
//! manages the lifecycle of that single connection.

#[cfg(feature = "bluez")]
mod bluez;
mod connect;
mod operation;
mod pump;
mod service;
mod transport;

#[cfg(feature = "bluez")]
pub use bluez::BluezAdapter;
pub use service::{SerialService, ServiceConfig, ServiceSnapshot};
pub use transport::{
    is_valid_address, ChannelMode, DeviceHandle, RadioAdapter, RadioStatus, SerialStream,
    SocketDescriptor, SPP_UUID,
};
