//! `osdp-sim`: run one ACU device against a simulated PD.
//!
//! ```text
//! osdp-sim [config.json] [--log-level debug] [--duration-ms 10000]
//! ```
//!
//! The optional JSON file holds a [`SimulationConfig`]. Missing fields fall
//! back to defaults; with no file at all the simulator runs a secure channel
//! handshake with the default key. `RUST_LOG=osdp_acu=trace` takes precedence
//! over `--log-level`.

use anyhow::{Context, Result};
use clap::Parser;
use osdp_acu::mock::{PdBehavior, SimulatedPd};
use osdp_acu::{Device, DeviceConfig, DeviceExchange, ExchangeConfig};
use osdp_core::SecureChannelKey;
use osdp_protocol::{Command, CommandCode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Run one OSDP device against a simulated PD
#[derive(Parser, Debug)]
#[command(name = "osdp-sim", version, about)]
struct Cli {
    /// Simulation config file (JSON)
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Override the configured run duration
    #[arg(short, long)]
    duration_ms: Option<u64>,
}

/// Everything the simulator needs, loaded from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct SimulationConfig {
    device: DeviceConfig,
    exchange: ExchangeConfig,
    /// Key held by the simulated PD. Defaults to the device's effective key.
    pd_key: Option<SecureChannelKey>,
    /// How long to run before shutting down.
    duration_ms: u64,
    /// Drop every reply for this long halfway through the run.
    outage_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            device: DeviceConfig::new(0x01).with_secure_channel(true),
            exchange: ExchangeConfig::default(),
            pd_key: None,
            duration_ms: 5_000,
            outage_ms: 0,
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<SimulationConfig> {
    let Some(path) = path else {
        return Ok(SimulationConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config: SimulationConfig =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    config.exchange.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(duration_ms) = cli.duration_ms {
        config.duration_ms = duration_ms;
    }
    let address = config.device.address;
    let pd_key = config.pd_key.unwrap_or_else(|| config.device.effective_key());

    info!(
        address,
        secure = config.device.use_secure_channel,
        interval_ms = config.exchange.poll_interval_ms,
        "Starting simulation"
    );

    let (pd, pd_handle) = SimulatedPd::new(address, pd_key);
    let device = Device::try_new(config.device.clone())?;
    let mut handle = DeviceExchange::new(device, pd, config.exchange.clone()).spawn();

    let duration = Duration::from_millis(config.duration_ms);
    let connected = tokio::time::timeout(duration, handle.wait_for(|s| s.connected)).await;
    match connected {
        Ok(status) => {
            let status = status?;
            info!(?status, "Device connected");
        }
        Err(_) => warn!(address, "Device did not connect"),
    }

    handle.send(Command::new(address, CommandCode::LedControl, vec![0x00, 0x01]))?;
    handle.send(Command::new(address, CommandCode::BuzzerControl, vec![0x00, 0x02]))?;

    if config.outage_ms > 0 {
        tokio::time::sleep(duration / 2).await;
        info!(outage_ms = config.outage_ms, "Simulating PD outage");
        pd_handle.set_behavior(PdBehavior::Silent);
        tokio::time::sleep(Duration::from_millis(config.outage_ms)).await;
        info!(status = ?handle.status(), "PD back online");
        pd_handle.set_behavior(PdBehavior::Normal);
        tokio::time::sleep(duration / 2).await;
    } else {
        tokio::time::sleep(duration).await;
    }

    let status = handle.status();
    let stats = handle.shutdown().await?;
    info!(
        connected = status.connected,
        exchanges = stats.exchanges,
        replies = stats.replies,
        timeouts = stats.timeouts,
        naks = stats.naks,
        "Simulation finished"
    );
    println!("{}", serde_json::to_string_pretty(&pd_handle.received())?);

    Ok(())
}
