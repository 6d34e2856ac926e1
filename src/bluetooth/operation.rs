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

//! Handles and completion reports shared by the background operations.

use tokio::sync::oneshot;

use super::transport::{DeviceHandle, SerialStream};
use crate::error::SerialError;

/// Identity of one background operation. Issued by the service, never reused.
pub type Generation = u64;

/// Owning handle of a running operation.
///
/// Dropping the handle cancels the operation.
pub(crate) struct OperationHandle {
    generation: Generation,
    cancel: Option<oneshot::Sender<()>>,
}

impl OperationHandle {
    /// Create a handle and the token its task listens on.
    pub(crate) fn new(generation: Generation) -> (Self, CancelToken) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                generation,
                cancel: Some(tx),
            },
            CancelToken(rx),
        )
    }

    pub(crate) fn generation(&self) -> Generation {
        self.generation
    }

    pub(crate) fn cancel(&mut self) {
        if let Some(tx) = self.cancel.take() {
            // The task may already be gone.
            let _ = tx.send(());
        }
    }
}

impl Drop for OperationHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Task side of an [`OperationHandle`].
pub(crate) struct CancelToken(oneshot::Receiver<()>);

impl CancelToken {
    /// Resolves once the owning handle is cancelled or dropped.
    pub(crate) async fn cancelled(&mut self) {
        let _ = (&mut self.0).await;
    }
}

/// Outcome reported by a background operation to the service.
pub(crate) enum OperationReport {
    Connected {
        generation: Generation,
        stream: Box<dyn SerialStream>,
        device: DeviceHandle,
    },
    ConnectFailed {
        generation: Generation,
        error: SerialError,
    },
    Received {
        generation: Generation,
        bytes: Vec<u8>,
    },
    Broken {
        generation: Generation,
        error: SerialError,
    },
}

impl OperationReport {
    pub(crate) fn generation(&self) -> Generation {
        match self {
            OperationReport::Connected { generation, .. }
            | OperationReport::ConnectFailed { generation, .. }
            | OperationReport::Received { generation, .. }
            | OperationReport::Broken { generation, .. } => *generation,
        }
    }
}
