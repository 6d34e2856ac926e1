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

//! Blue Serial terminal.
//!
//! Connects to a Bluetooth serial device, prints what it sends and writes
//! every line typed on stdin.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blueserial::bluetooth::BluezAdapter;
use blueserial::config::Config;
use blueserial::{
    ConnectionState, RadioAdapter, RadioStatus, SerialError, SerialListener, SerialService,
};

#[derive(Parser, Debug)]
#[command(name = "blueserial", version, about = "Bluetooth serial terminal")]
struct Cli {
    /// Address of the remote device, e.g. 98:D3:31:FB:2A:10
    #[arg(short, long)]
    address: Option<String>,

    /// RFCOMM channel, overrides the configuration file
    #[arg(short, long)]
    channel: Option<u8>,

    /// Path to the configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Prints serial traffic to stdout and lifecycle to the log.
struct ConsoleListener;

impl SerialListener for ConsoleListener {
    fn on_radio_not_supported(&mut self) {
        error!("Bluetooth is not supported on this machine");
    }

    fn on_radio_disabled(&mut self) {
        error!("Bluetooth adapter is turned off");
    }

    fn on_state_changed(&mut self, state: ConnectionState) {
        info!("{}", state);
    }

    fn on_device_connected(&mut self, name: &str, address: &str) {
        info!("Connected to {} ({})", name, address);
    }

    fn on_serial_read(&mut self, message: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(message.as_bytes());
        let _ = stdout.flush();
    }

    fn on_serial_write(&mut self, _message: &str) {}

    fn on_error(&mut self, error: &SerialError) {
        warn!("{}", error);
    }
}

/// Error reported when setup finds no usable radio.
fn unavailable(status: RadioStatus) -> SerialError {
    match status {
        RadioStatus::Disabled => SerialError::RadioDisabled,
        RadioStatus::NotSupported | RadioStatus::Enabled => SerialError::RadioUnavailable,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("blueserial=info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    info!("Starting Blue Serial v{}...", env!("CARGO_PKG_VERSION"));

    let address = cli
        .address
        .or_else(|| config.bluetooth.default_address.clone())
        .ok_or_else(|| anyhow!("no device address given"))?;
    let channel = cli.channel.unwrap_or(config.bluetooth.rfcomm_channel);

    let radio = BluezAdapter::new(channel).await;
    if let Some((name, addr)) = radio.local_adapter().await {
        info!("Local adapter {} ({})", name, addr);
    }

    let radio = Arc::new(radio);
    let service = SerialService::new(
        radio.clone(),
        Box::new(ConsoleListener),
        config.service_config(),
    );

    if !service.setup().await {
        // The listener is notified asynchronously and may not run before exit.
        return Err(unavailable(radio.status().await).into());
    }
    service.start();
    service.connect_address(&address).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if service.is_connected() {
                        service.writeln(&line).await;
                    } else {
                        warn!("Not connected, dropping input");
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    service.stop();
    info!("Blue Serial stopped");
    Ok(())
}
