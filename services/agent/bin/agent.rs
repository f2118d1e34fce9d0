//! Main Entrypoint for the Voice Agent
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Registering the greeting job handler with the agent server.
//! 3. Minting an access token and dispatching one job into the target room.
//! 4. Running until the job finishes or Ctrl+C is received.

use anyhow::Context;
use clap::Parser;
use livekit_signal::{AccessToken, SignalRoom, VideoGrants};
use proctor_agent::{
    config::AgentConfig,
    telemetry,
    worker::{AgentServer, JobRequest},
};
use proctor_core::handle_greeting_job;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(version, about = "Joins a room and greets it through a voice session")]
struct Cli {
    /// Room to join. Overrides LIVEKIT_ROOM.
    #[arg(long)]
    room: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --- 1. Load Configuration ---
    let config = AgentConfig::from_env().context("Failed to load configuration")?;
    telemetry::init(config.log_level);
    info!("Starting agent with name: {}", config.agent_name);

    // --- 2. Register the Job Handler ---
    let session_config = Arc::new(config.session_config());
    let greeting = config.greeting.clone();
    let mut server = AgentServer::new(config.agent_name.clone());
    server.rtc_session(move |ctx| {
        let session_config = session_config.clone();
        let greeting = greeting.clone();
        async move {
            handle_greeting_job(ctx, session_config, greeting).await;
        }
    });

    // --- 3. Dispatch the Job ---
    let room_name = cli.room.unwrap_or_else(|| config.room_name.clone());
    let token = AccessToken::new(
        config.api_key.expose_secret(),
        config.api_secret.expose_secret(),
    )
    .with_identity(&config.agent_name)
    .with_name(&config.agent_name)
    .with_grants(VideoGrants::agent_join(&room_name))
    .to_jwt()
    .context("Failed to mint room access token")?;

    let (jobs_tx, jobs_rx) = mpsc::channel(1);
    jobs_tx
        .send(JobRequest {
            job_id: Uuid::new_v4().to_string(),
            room: Arc::new(SignalRoom::new(room_name.clone())),
            url: config.livekit_url.clone(),
            token: SecretString::from(token),
        })
        .await
        .context("Failed to queue job")?;
    drop(jobs_tx);

    // --- 4. Serve ---
    info!(room = %room_name, url = %config.livekit_url, "Agent configured. Serving jobs...");
    let server = Arc::new(server);
    server.run(jobs_rx, telemetry::shutdown_signal()).await;

    info!("Agent has shut down.");
    Ok(())
}
