//! Access tokens for joining a realtime room.
//!
//! Tokens are HS256 JWTs signed with the project's API secret. The API key is
//! the issuer, the participant identity is the subject, and room permissions
//! travel in the `video` claim.

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode, get_current_timestamp};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default validity of a minted token.
pub const DEFAULT_TTL: Duration = Duration::from_secs(6 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("access token requires a participant identity")]
    MissingIdentity,
    #[error("failed to sign access token: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),
}

/// Room permissions carried by a token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrants {
    pub room_join: bool,
    pub room: String,
    pub can_publish: bool,
    pub can_subscribe: bool,
    pub can_publish_data: bool,
    pub agent: bool,
}

impl VideoGrants {
    /// Grants for an agent participant joining `room`.
    pub fn agent_join(room: impl Into<String>) -> Self {
        Self {
            room_join: true,
            room: room.into(),
            can_publish: true,
            can_subscribe: true,
            can_publish_data: true,
            agent: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub nbf: u64,
    pub exp: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub video: VideoGrants,
}

pub struct AccessToken {
    api_key: String,
    api_secret: String,
    identity: String,
    name: String,
    ttl: Duration,
    grants: VideoGrants,
}

impl AccessToken {
    pub fn new(api_key: &str, api_secret: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            identity: String::new(),
            name: String::new(),
            ttl: DEFAULT_TTL,
            grants: VideoGrants::default(),
        }
    }

    pub fn with_identity(mut self, identity: &str) -> Self {
        self.identity = identity.to_string();
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_grants(mut self, grants: VideoGrants) -> Self {
        self.grants = grants;
        self
    }

    pub fn to_jwt(self) -> Result<String, TokenError> {
        if self.identity.is_empty() {
            return Err(TokenError::MissingIdentity);
        }
        let now = get_current_timestamp();
        let claims = Claims {
            iss: self.api_key,
            sub: self.identity,
            nbf: now,
            exp: now + self.ttl.as_secs(),
            name: self.name,
            video: self.grants,
        };
        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.api_secret.as_bytes()),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    #[test]
    fn minted_token_carries_identity_and_grants() {
        let jwt = AccessToken::new("api-key", "api-secret")
            .with_identity("proctor-agent")
            .with_name("Quiz Proctor")
            .with_ttl(Duration::from_secs(600))
            .with_grants(VideoGrants::agent_join("exam-room"))
            .to_jwt()
            .unwrap();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&["api-key"]);
        let data = decode::<Claims>(
            &jwt,
            &DecodingKey::from_secret(b"api-secret"),
            &validation,
        )
        .unwrap();

        assert_eq!(data.claims.sub, "proctor-agent");
        assert_eq!(data.claims.name, "Quiz Proctor");
        assert_eq!(data.claims.exp - data.claims.nbf, 600);
        assert_eq!(data.claims.video, VideoGrants::agent_join("exam-room"));
    }

    #[test]
    fn grants_use_camel_case_claim_names() {
        let value = serde_json::to_value(VideoGrants::agent_join("exam-room")).unwrap();
        assert_eq!(value["roomJoin"], true);
        assert_eq!(value["canPublishData"], true);
        assert_eq!(value["room"], "exam-room");
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let jwt = AccessToken::new("api-key", "api-secret")
            .with_identity("proctor-agent")
            .to_jwt()
            .unwrap();
        let result = decode::<Claims>(
            &jwt,
            &DecodingKey::from_secret(b"other-secret"),
            &Validation::new(Algorithm::HS256),
        );
        assert!(result.is_err());
    }

    #[test]
    fn identity_is_required() {
        let err = AccessToken::new("api-key", "api-secret").to_jwt().unwrap_err();
        assert!(matches!(err, TokenError::MissingIdentity));
    }
}
