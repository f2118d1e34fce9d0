//! Avatar Session Requester
//!
//! Sends one avatar-session request and prints the provider's status and
//! body exactly as received.

use anyhow::Context;
use clap::Parser;
use proctor_agent::{config::AvatarConfig, telemetry};
use proctor_core::avatar::AvatarClient;

#[derive(Parser, Debug)]
#[command(version, about = "Creates one avatar session and prints the raw response")]
struct Cli {
    /// Overrides ANAM_PERSONA_NAME.
    #[arg(long)]
    persona_name: Option<String>,
    /// Overrides ANAM_AVATAR_ID.
    #[arg(long)]
    avatar_id: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AvatarConfig::from_env().context("Failed to load configuration")?;
    telemetry::init(config.log_level);

    let mut persona = config.persona;
    if let Some(name) = cli.persona_name {
        persona.name = name;
    }
    if let Some(avatar_id) = cli.avatar_id {
        persona.avatar_id = avatar_id;
    }

    let client = AvatarClient::new(config.api_base, config.api_key);
    let response = client
        .request_avatar_session(&persona)
        .await
        .context("Avatar session request failed")?;

    println!("Status Code: {}", response.status);
    println!("Response: {}", response.body);
    Ok(())
}
