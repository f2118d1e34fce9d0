//! Job Handling
//!
//! A job is one unit of work dispatched to the agent process, scoped to a
//! single room. This module contains the bootstrapper that builds and starts
//! a [`VoiceSession`] for the job's room and the greeting driver that speaks
//! one scripted line once the session is ready.
//!
//! [`handle_greeting_job`] is the top-level job body: every failure is logged
//! with the job's context and swallowed, so one bad job never takes down the
//! process that hosts the others.

use crate::provider::ProviderError;
use crate::room::{Room, RoomError};
use crate::session::{SessionConfig, SessionError, Utterance, VoiceSession};
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

/// The line spoken by the greeting driver unless configured otherwise.
pub const DEFAULT_GREETING: &str = "Hello, can you hear me? I am the test agent.";

/// Per-job handle supplied by the agent server.
#[derive(Clone)]
pub struct JobContext {
    pub job_id: String,
    pub agent_name: String,
    pub room: Arc<dyn Room>,
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("provider construction failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("realtime room error: {0}")]
    Room(#[from] RoomError),
    #[error("voice session error: {0}")]
    Session(SessionError),
}

impl From<SessionError> for JobError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Provider(e) => JobError::Provider(e),
            SessionError::Room(e) => JobError::Room(e),
            other => JobError::Session(other),
        }
    }
}

/// What a greeting job accomplished.
#[derive(Debug)]
pub enum JobOutcome {
    Greeted { session_id: Uuid, utterance: Utterance },
    Failed(JobError),
}

/// Builds a voice session from `config` and starts it on the job's room.
///
/// Returns only once the session is ready to speak.
pub async fn start_session(
    ctx: &JobContext,
    config: &SessionConfig,
) -> Result<VoiceSession, JobError> {
    info!(
        stt = %config.stt_provider,
        llm = %config.llm_provider,
        tts = %config.tts_provider,
        "Constructing voice session..."
    );
    let mut session = VoiceSession::new(config)?;

    info!(session_id = %session.id(), "Starting session...");
    session.start(ctx.room.clone()).await?;

    info!(session_id = %session.id(), "Session started.");
    Ok(session)
}

/// Starts a session and speaks `greeting` through it.
pub async fn greet(
    ctx: &JobContext,
    config: &SessionConfig,
    greeting: &str,
) -> Result<(VoiceSession, Utterance), JobError> {
    let mut session = start_session(ctx, config).await?;
    let utterance = session.say(greeting).await?;
    info!(utterance_id = %utterance.id, "Greeting sent.");
    Ok((session, utterance))
}

/// The greeting job body. Never returns an error: failures are logged and
/// reported through [`JobOutcome::Failed`].
pub async fn handle_greeting_job(
    ctx: JobContext,
    config: Arc<SessionConfig>,
    greeting: String,
) -> JobOutcome {
    let span = info_span!("job", job_id = %ctx.job_id, room = %ctx.room.name());
    async move {
        info!(agent = %ctx.agent_name, "Job received!");
        match greet(&ctx, &config, &greeting).await {
            Ok((mut session, utterance)) => {
                let session_id = session.id();
                session.close().await;
                JobOutcome::Greeted {
                    session_id,
                    utterance,
                }
            }
            Err(e) => {
                error!(error = %e, "Session failed.");
                JobOutcome::Failed(e)
            }
        }
    }
    .instrument(span)
    .await
}
