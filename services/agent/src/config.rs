use proctor_core::SessionConfig;
use proctor_core::avatar::{DEFAULT_AVATAR_API_BASE, PersonaConfig};
use proctor_core::job::DEFAULT_GREETING;
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
    #[error("Failed to read token file {path}: {source}")]
    TokenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Token file {0} is empty")]
    EmptyTokenFile(PathBuf),
}

const DEFAULT_AGENT_NAME: &str = "unnamed";
const DEFAULT_ROOM: &str = "proctor-test";
const DEFAULT_TOKEN_FILE: &str = "/tmp/token.txt";
const DEFAULT_STT: &str = "assemblyai/universal-streaming:en";
const DEFAULT_LLM: &str = "openai/gpt-4o-mini";
const DEFAULT_TTS: &str = "cartesia/sonic-3:9626c31c-bec5-4cca-baa8-f8ba9e84c8bc";
const DEFAULT_PERSONA_NAME: &str = "Quiz Proctor";
const DEFAULT_AVATAR_ID: &str = "RQS5Qi-sAdDJ_s5FzJyDx";

/// Loads `.env.local` then `.env`, outside of tests.
fn load_dotenv() {
    // Only load from .env in non-test mode to avoid contamination
    if !cfg!(test) {
        dotenvy::from_filename(".env.local").ok();
        dotenvy::dotenv().ok();
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::MissingVar(name.to_string())),
    }
}

fn optional_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn log_level() -> Result<Level, ConfigError> {
    let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
    log_level_str.parse::<Level>().map_err(|_| {
        ConfigError::InvalidValue(
            "RUST_LOG".to_string(),
            format!("'{}' is not a valid log level", log_level_str),
        )
    })
}

/// Reads a pre-issued access token. Surrounding whitespace is trimmed.
pub fn load_token_file(path: &Path) -> Result<SecretString, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::TokenFile {
        path: path.to_path_buf(),
        source,
    })?;
    let token = raw.trim();
    if token.is_empty() {
        return Err(ConfigError::EmptyTokenFile(path.to_path_buf()));
    }
    Ok(SecretString::from(token.to_string()))
}

/// Configuration for the voice agent worker.
#[derive(Debug)]
pub struct AgentConfig {
    pub agent_name: String,
    pub livekit_url: String,
    pub api_key: SecretString,
    pub api_secret: SecretString,
    pub room_name: String,
    pub stt_provider: String,
    pub llm_provider: String,
    pub tts_provider: String,
    pub greeting: String,
    pub log_level: Level,
}

impl AgentConfig {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv();

        Ok(Self {
            agent_name: optional_or("LIVEKIT_AGENT_NAME", DEFAULT_AGENT_NAME),
            livekit_url: required("LIVEKIT_URL")?,
            api_key: SecretString::from(required("LIVEKIT_API_KEY")?),
            api_secret: SecretString::from(required("LIVEKIT_API_SECRET")?),
            room_name: optional_or("LIVEKIT_ROOM", DEFAULT_ROOM),
            stt_provider: optional_or("AGENT_STT", DEFAULT_STT),
            llm_provider: optional_or("AGENT_LLM", DEFAULT_LLM),
            tts_provider: optional_or("AGENT_TTS", DEFAULT_TTS),
            greeting: optional_or("AGENT_GREETING", DEFAULT_GREETING),
            log_level: log_level()?,
        })
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            stt_provider: self.stt_provider.clone(),
            llm_provider: self.llm_provider.clone(),
            tts_provider: self.tts_provider.clone(),
            agent_name: self.agent_name.clone(),
            room_url: self.livekit_url.clone(),
        }
    }
}

/// Configuration for the avatar session requester.
#[derive(Debug)]
pub struct AvatarConfig {
    pub api_key: SecretString,
    pub api_base: String,
    pub persona: PersonaConfig,
    pub log_level: Level,
}

impl AvatarConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv();

        Ok(Self {
            api_key: SecretString::from(required("ANAM_API_KEY")?),
            api_base: optional_or("ANAM_API_BASE", DEFAULT_AVATAR_API_BASE),
            persona: PersonaConfig {
                name: optional_or("ANAM_PERSONA_NAME", DEFAULT_PERSONA_NAME),
                avatar_id: optional_or("ANAM_AVATAR_ID", DEFAULT_AVATAR_ID),
            },
            log_level: log_level()?,
        })
    }
}

/// Configuration for the connectivity probe.
#[derive(Debug)]
pub struct ProbeConfig {
    pub livekit_url: String,
    pub room_name: String,
    pub token_path: PathBuf,
    pub hold: Duration,
    pub log_level: Level,
}

impl ProbeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv();

        let hold_str = optional_or("PROBE_HOLD_SECS", "5");
        let hold_secs = hold_str.parse::<u64>().map_err(|e| {
            ConfigError::InvalidValue("PROBE_HOLD_SECS".to_string(), e.to_string())
        })?;

        Ok(Self {
            livekit_url: required("LIVEKIT_URL")?,
            room_name: optional_or("LIVEKIT_ROOM", DEFAULT_ROOM),
            token_path: PathBuf::from(optional_or("LIVEKIT_TOKEN_FILE", DEFAULT_TOKEN_FILE)),
            hold: Duration::from_secs(hold_secs),
            log_level: log_level()?,
        })
    }

    pub fn load_token(&self) -> Result<SecretString, ConfigError> {
        load_token_file(&self.token_path)
    }
}
