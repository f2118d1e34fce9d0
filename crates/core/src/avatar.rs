//! Avatar Session Client
//!
//! Creates one remote avatar session with a single authenticated POST. The
//! response is returned verbatim: a non-2xx status is a result for the caller
//! to inspect, not an error.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, info};

pub const DEFAULT_AVATAR_API_BASE: &str = "https://api.anam.ai";
const SESSION_PATH: &str = "/v1/engine/session";

#[derive(Debug, thiserror::Error)]
pub enum AvatarError {
    #[error("avatar request failed: {0}")]
    Network(#[from] reqwest::Error),
}

/// Identity and appearance of the avatar to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonaConfig {
    pub name: String,
    #[serde(rename = "avatarId")]
    pub avatar_id: String,
}

#[derive(Debug, Serialize)]
pub struct AvatarSessionRequest<'a> {
    pub persona_config: &'a PersonaConfig,
}

/// The provider's answer, untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarSessionResponse {
    pub status: u16,
    pub body: String,
}

impl AvatarSessionResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub struct AvatarClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl AvatarClient {
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, SESSION_PATH)
    }

    /// Sends the session request for `persona`.
    pub async fn request_avatar_session(
        &self,
        persona: &PersonaConfig,
    ) -> Result<AvatarSessionResponse, AvatarError> {
        let url = self.endpoint();
        debug!(%url, persona = %persona.name, "Requesting avatar session.");

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&AvatarSessionRequest {
                persona_config: persona,
            })
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        info!(status, "Avatar session request completed.");
        Ok(AvatarSessionResponse { status, body })
    }
}
