//! Provider Identifiers
//!
//! A voice session is described by three strings naming the speech-to-text,
//! language-model and text-to-speech backends. Each identifier has the form
//! `provider/model[:variant]`, e.g. `assemblyai/universal-streaming:en` or
//! `cartesia/sonic-3:<voice-id>`. The backends themselves are external; this
//! module only validates and splits the identifiers so that a malformed one
//! fails at construction time rather than inside the realtime framework.

use serde::Serialize;
use std::fmt;

/// Which stage of the voice pipeline an identifier configures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Stt,
    Llm,
    Tts,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProviderKind::Stt => "stt",
            ProviderKind::Llm => "llm",
            ProviderKind::Tts => "tts",
        };
        f.write_str(label)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{0} provider identifier is empty")]
    Empty(ProviderKind),
    #[error("malformed {kind} provider identifier '{id}': {reason}")]
    Malformed {
        kind: ProviderKind,
        id: String,
        reason: &'static str,
    },
}

/// A parsed provider identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderSpec {
    pub kind: ProviderKind,
    pub provider: String,
    pub model: String,
    /// Language for STT, voice id for TTS.
    pub variant: Option<String>,
    /// The identifier exactly as configured, forwarded to the backend.
    pub id: String,
}

impl ProviderSpec {
    pub fn parse(kind: ProviderKind, id: &str) -> Result<Self, ProviderError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ProviderError::Empty(kind));
        }
        let malformed = |reason| ProviderError::Malformed {
            kind,
            id: id.to_string(),
            reason,
        };

        if id.chars().any(char::is_whitespace) {
            return Err(malformed("contains whitespace"));
        }
        let (provider, rest) = id.split_once('/').ok_or(malformed("expected 'provider/model'"))?;
        if provider.is_empty() {
            return Err(malformed("missing provider name"));
        }

        let (model, variant) = match rest.split_once(':') {
            Some((_, "")) => return Err(malformed("empty variant after ':'")),
            Some((model, variant)) => (model, Some(variant.to_string())),
            None => (rest, None),
        };
        if model.is_empty() {
            return Err(malformed("missing model name"));
        }

        Ok(Self {
            kind,
            provider: provider.to_string(),
            model: model.to_string(),
            variant,
            id: id.to_string(),
        })
    }
}

impl fmt::Display for ProviderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// The three pipeline stages of one voice session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderSet {
    pub stt: ProviderSpec,
    pub llm: ProviderSpec,
    pub tts: ProviderSpec,
}

impl ProviderSet {
    pub fn parse(stt: &str, llm: &str, tts: &str) -> Result<Self, ProviderError> {
        Ok(Self {
            stt: ProviderSpec::parse(ProviderKind::Stt, stt)?,
            llm: ProviderSpec::parse(ProviderKind::Llm, llm)?,
            tts: ProviderSpec::parse(ProviderKind::Tts, tts)?,
        })
    }
}
