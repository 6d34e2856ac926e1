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

//! Read/write worker bound to one connected socket.

use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info};

use super::operation::{CancelToken, Generation, OperationHandle, OperationReport};
use super::transport::SerialStream;
use crate::error::{Result, SerialError};

type Writer = Arc<Mutex<Option<WriteHalf<Box<dyn SerialStream>>>>>;

/// Handle to a running data pump.
///
/// Dropping it cancels the read loop and aborts any write in flight.
pub(crate) struct DataPump {
    handle: OperationHandle,
    writer: Writer,
    // Never sent on; dropping it wakes every pending write.
    closed: watch::Sender<()>,
}

impl DataPump {
    /// Split `stream` and start its read loop on the given runtime.
    pub(crate) fn spawn(
        runtime: &Handle,
        generation: Generation,
        stream: Box<dyn SerialStream>,
        buffer_size: usize,
        reports: mpsc::UnboundedSender<OperationReport>,
    ) -> Self {
        debug!("Data pump #{} started", generation);
        let (reader, writer) = tokio::io::split(stream);
        let writer = Arc::new(Mutex::new(Some(writer)));
        let (handle, cancel) = OperationHandle::new(generation);
        let (closed, _) = watch::channel(());

        runtime.spawn(read_loop(
            generation,
            reader,
            writer.clone(),
            buffer_size.max(1),
            reports,
            cancel,
        ));

        Self {
            handle,
            writer,
            closed,
        }
    }

    pub(crate) fn generation(&self) -> Generation {
        self.handle.generation()
    }

    /// Writer that can be used after the service lock is released.
    pub(crate) fn writer(&self) -> PumpWriter {
        PumpWriter {
            generation: self.generation(),
            writer: self.writer.clone(),
            closed: self.closed.subscribe(),
        }
    }
}

/// Write side of a data pump, usable without holding the service lock.
pub(crate) struct PumpWriter {
    generation: Generation,
    writer: Writer,
    closed: watch::Receiver<()>,
}

impl PumpWriter {
    /// Generation of the pump this writer belongs to.
    pub(crate) fn generation(&self) -> Generation {
        self.generation
    }

    /// Write all of `data` and flush.
    ///
    /// Fails as soon as the pump is cancelled, even mid-write, so that the
    /// socket is never held open by a stalled peer.
    pub(crate) async fn write(&self, data: &[u8]) -> Result<()> {
        let mut closed = self.closed.clone();
        // `changed` only resolves once the pump drops its sender.
        tokio::select! {
            _ = closed.changed() => {
                Err(SerialError::StreamWriteFailed("socket closed".to_string()))
            }
            result = self.write_locked(data) => result,
        }
    }

    async fn write_locked(&self, data: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| SerialError::StreamWriteFailed("socket closed".to_string()))?;
        writer
            .write_all(data)
            .await
            .map_err(|e| SerialError::StreamWriteFailed(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| SerialError::StreamWriteFailed(e.to_string()))
    }
}

async fn read_loop(
    generation: Generation,
    mut reader: ReadHalf<Box<dyn SerialStream>>,
    writer: Writer,
    buffer_size: usize,
    reports: mpsc::UnboundedSender<OperationReport>,
    mut cancel: CancelToken,
) {
    let mut buf = vec![0u8; buffer_size];

    let error = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Data pump #{} cancelled", generation);
                // Both halves must go for the socket to close.
                drop(reader);
                writer.lock().await.take();
                return;
            }
            result = reader.read(&mut buf) => match result {
                Ok(0) => {
                    info!("Connection closed by remote");
                    break SerialError::StreamReadFailed("end of stream".to_string());
                }
                Ok(n) => {
                    debug!("Received {} bytes", n);
                    let report = OperationReport::Received {
                        generation,
                        bytes: buf[..n].to_vec(),
                    };
                    if reports.send(report).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    error!("Read error: {}", e);
                    break SerialError::StreamReadFailed(e.to_string());
                }
            },
        }
    };

    let _ = reports.send(OperationReport::Broken { generation, error });
}
