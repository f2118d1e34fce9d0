//! Connectivity Probe
//!
//! Joins a room with the pre-issued token from `LIVEKIT_TOKEN_FILE`, holds
//! the connection, then disconnects. Ctrl+C ends the hold early.

use anyhow::Context;
use clap::Parser;
use livekit_signal::SignalRoom;
use proctor_agent::{config::ProbeConfig, telemetry};
use proctor_core::{Room, probe::ConnectivityProbe};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about = "Connects to a room, holds, and disconnects")]
struct Cli {
    /// Seconds to hold the connection. Overrides PROBE_HOLD_SECS.
    #[arg(long)]
    hold_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ProbeConfig::from_env().context("Failed to load configuration")?;
    telemetry::init(config.log_level);

    let token = config.load_token().context("Failed to load access token")?;
    let hold = cli.hold_secs.map(Duration::from_secs).unwrap_or(config.hold);

    let room: Arc<dyn Room> = Arc::new(SignalRoom::new(config.room_name.clone()));
    let probe = ConnectivityProbe::new(config.livekit_url.clone(), token, hold);
    let report = probe
        .run(room, telemetry::shutdown_signal())
        .await
        .context("Connectivity probe failed")?;

    info!(
        room = %report.room,
        held = ?report.held,
        interrupted = report.interrupted,
        "Probe complete."
    );
    Ok(())
}
