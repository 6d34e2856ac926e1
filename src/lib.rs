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

//! Bluetooth Serial Port Profile client.
//!
//! [`SerialService`] opens an RFCOMM link to a single remote device, pumps
//! bytes in both directions and reports state changes and traffic to a
//! [`SerialListener`].

pub mod bluetooth;
pub mod config;
pub mod error;
pub mod events;
pub mod state;

pub use bluetooth::{DeviceHandle, RadioAdapter, RadioStatus, SerialService, ServiceConfig};
pub use error::SerialError;
pub use events::{ChannelListener, SerialEvent, SerialListener};
pub use state::{ConnectedDevice, ConnectionState};
