//! Voice Session
//!
//! A `VoiceSession` binds the STT/LLM/TTS pipeline described by a
//! [`SessionConfig`] to exactly one [`Room`]. Its lifecycle is tracked by an
//! explicit [`SessionState`] tag so that speaking before the session is ready
//! is rejected instead of depending on call order.
//!
//! Accepted utterances are queued onto a speech pipeline task that hands them
//! to the room's TTS backend on [`SPEECH_TOPIC`]. `say` returns as soon as the
//! utterance is queued; it does not wait for playback.

use crate::provider::{ProviderError, ProviderSet};
use crate::room::{Room, RoomError};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Topic on which the session announces its pipeline when it starts.
pub const SESSION_TOPIC: &str = "lk.agent.session";
/// Topic on which accepted utterances are handed to the TTS backend.
pub const SPEECH_TOPIC: &str = "lk.agent.speech";

const SPEECH_QUEUE_DEPTH: usize = 16;

/// Everything needed to build one voice session. Built once per job and
/// shared read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub stt_provider: String,
    pub llm_provider: String,
    pub tts_provider: String,
    pub agent_name: String,
    pub room_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unstarted,
    Starting,
    Ready,
    Failed,
    Ended,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session is not ready to speak (state: {state})")]
    NotReady { state: SessionState },
    #[error("session cannot be started from state {state}")]
    AlreadyStarted { state: SessionState },
    #[error("refusing to speak an empty utterance")]
    EmptyUtterance,
    #[error("speech pipeline has shut down")]
    PipelineClosed,
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Room(#[from] RoomError),
}

/// A line of text queued for synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub id: Uuid,
    pub text: String,
}

#[derive(Serialize)]
struct SessionAnnouncement<'a> {
    session_id: Uuid,
    agent_name: &'a str,
    providers: &'a ProviderSet,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    session_id: Uuid,
    utterance_id: Uuid,
    text: &'a str,
    tts: &'a str,
}

pub struct VoiceSession {
    id: Uuid,
    agent_name: String,
    providers: ProviderSet,
    state: SessionState,
    room: Option<Arc<dyn Room>>,
    speech_tx: Option<mpsc::Sender<Utterance>>,
    pipeline: Option<JoinHandle<()>>,
}

impl VoiceSession {
    /// Builds the provider pipeline from `config`. Nothing touches the
    /// network until [`VoiceSession::start`].
    pub fn new(config: &SessionConfig) -> Result<Self, SessionError> {
        let providers = ProviderSet::parse(
            &config.stt_provider,
            &config.llm_provider,
            &config.tts_provider,
        )?;
        Ok(Self {
            id: Uuid::new_v4(),
            agent_name: config.agent_name.clone(),
            providers,
            state: SessionState::Unstarted,
            room: None,
            speech_tx: None,
            pipeline: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    /// Attaches the session to `room` and waits until it is ready to speak.
    ///
    /// The room must already be connected. A room holds at most one session;
    /// a second start against the same room fails with
    /// [`RoomError::SessionAlreadyActive`].
    pub async fn start(&mut self, room: Arc<dyn Room>) -> Result<(), SessionError> {
        if self.state != SessionState::Unstarted {
            return Err(SessionError::AlreadyStarted { state: self.state });
        }
        self.state = SessionState::Starting;

        if let Err(e) = self.attach(&room).await {
            self.state = SessionState::Failed;
            return Err(e);
        }

        let (tx, rx) = mpsc::channel(SPEECH_QUEUE_DEPTH);
        self.pipeline = Some(tokio::spawn(run_speech_pipeline(
            room.clone(),
            self.id,
            self.providers.tts.id.clone(),
            rx,
        )));
        self.speech_tx = Some(tx);
        self.room = Some(room);
        self.state = SessionState::Ready;
        Ok(())
    }

    async fn attach(&self, room: &Arc<dyn Room>) -> Result<(), SessionError> {
        if !room.is_connected() {
            return Err(RoomError::NotConnected(room.name().to_string()).into());
        }
        room.claim_session(self.id)?;

        let announcement = SessionAnnouncement {
            session_id: self.id,
            agent_name: &self.agent_name,
            providers: &self.providers,
        };
        let payload = serde_json::to_string(&announcement).map_err(|e| RoomError::Publish {
            topic: SESSION_TOPIC.to_string(),
            reason: e.to_string(),
        })?;
        if let Err(e) = room.publish_data(SESSION_TOPIC, payload).await {
            room.release_session(self.id);
            return Err(e.into());
        }
        Ok(())
    }

    /// Queues `text` for synthesis. Returns once the speech pipeline has
    /// accepted the utterance.
    ///
    /// A session whose room has disconnected is ended here, and the
    /// utterance is rejected.
    pub async fn say(&mut self, text: &str) -> Result<Utterance, SessionError> {
        if self.state == SessionState::Ready && !self.room_connected() {
            warn!(session_id = %self.id, "Room disconnected; ending voice session.");
            self.end_detached();
        }
        if self.state != SessionState::Ready {
            return Err(SessionError::NotReady { state: self.state });
        }
        if text.trim().is_empty() {
            return Err(SessionError::EmptyUtterance);
        }
        let tx = self
            .speech_tx
            .as_ref()
            .ok_or(SessionError::NotReady { state: self.state })?;

        let utterance = Utterance {
            id: Uuid::new_v4(),
            text: text.to_string(),
        };
        tx.send(utterance.clone())
            .await
            .map_err(|_| SessionError::PipelineClosed)?;
        debug!(session_id = %self.id, utterance_id = %utterance.id, "Utterance accepted.");
        Ok(utterance)
    }

    fn room_connected(&self) -> bool {
        self.room.as_ref().is_some_and(|room| room.is_connected())
    }

    /// Ends the session without draining; queued speech has nowhere to go.
    fn end_detached(&mut self) {
        self.speech_tx = None;
        if let Some(room) = self.room.take() {
            room.release_session(self.id);
        }
        self.state = SessionState::Ended;
    }

    /// Drains queued speech, releases the room and ends the session.
    pub async fn close(&mut self) {
        self.speech_tx = None;
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.await {
                warn!(session_id = %self.id, error = %e, "Speech pipeline task failed.");
            }
        }
        if let Some(room) = self.room.take() {
            room.release_session(self.id);
        }
        if self.state != SessionState::Failed {
            self.state = SessionState::Ended;
        }
        info!(session_id = %self.id, "Voice session ended.");
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        if let Some(room) = self.room.take() {
            room.release_session(self.id);
        }
    }
}

async fn run_speech_pipeline(
    room: Arc<dyn Room>,
    session_id: Uuid,
    tts: String,
    mut rx: mpsc::Receiver<Utterance>,
) {
    while let Some(utterance) = rx.recv().await {
        let request = SpeechRequest {
            session_id,
            utterance_id: utterance.id,
            text: &utterance.text,
            tts: &tts,
        };
        let payload = match serde_json::to_string(&request) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(utterance_id = %utterance.id, error = %e, "Could not encode speech request.");
                continue;
            }
        };
        match room.publish_data(SPEECH_TOPIC, payload).await {
            Ok(()) => debug!(utterance_id = %utterance.id, "Speech request handed to TTS."),
            Err(e) => warn!(utterance_id = %utterance.id, error = %e, "Speech request dropped."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::MockRoom;
    use crate::testing::FakeRoom;

    fn config() -> SessionConfig {
        SessionConfig {
            stt_provider: "provider/model:en".to_string(),
            llm_provider: "provider/model".to_string(),
            tts_provider: "provider/voice-id".to_string(),
            agent_name: "test-agent".to_string(),
            room_url: "wss://example".to_string(),
        }
    }

    #[tokio::test]
    async fn say_before_start_is_rejected() {
        let mut session = VoiceSession::new(&config()).unwrap();
        let err = session.say("hello").await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::NotReady {
                state: SessionState::Unstarted
            }
        ));
    }

    #[tokio::test]
    async fn start_announces_pipeline_and_becomes_ready() {
        let room = Arc::new(FakeRoom::connected("exam-room"));
        let mut session = VoiceSession::new(&config()).unwrap();
        session.start(room.clone()).await.unwrap();

        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(room.active_session(), Some(session.id()));

        let announced = room.published(SESSION_TOPIC);
        assert_eq!(announced.len(), 1);
        let body: serde_json::Value = serde_json::from_str(&announced[0]).unwrap();
        assert_eq!(body["agent_name"], "test-agent");
        assert_eq!(body["providers"]["tts"]["id"], "provider/voice-id");
    }

    #[tokio::test]
    async fn second_session_on_same_room_is_rejected() {
        let room = Arc::new(FakeRoom::connected("exam-room"));
        let mut first = VoiceSession::new(&config()).unwrap();
        first.start(room.clone()).await.unwrap();

        let mut second = VoiceSession::new(&config()).unwrap();
        let err = second.start(room.clone()).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Room(RoomError::SessionAlreadyActive { .. })
        ));
        assert_eq!(second.state(), SessionState::Failed);
        assert_eq!(room.active_session(), Some(first.id()));
    }

    #[tokio::test]
    async fn restarting_a_session_is_rejected() {
        let room = Arc::new(FakeRoom::connected("exam-room"));
        let mut session = VoiceSession::new(&config()).unwrap();
        session.start(room.clone()).await.unwrap();
        let err = session.start(room).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::AlreadyStarted {
                state: SessionState::Ready
            }
        ));
    }

    #[tokio::test]
    async fn start_on_disconnected_room_fails() {
        let mut room = MockRoom::new();
        room.expect_is_connected().return_const(false);
        room.expect_name().return_const("exam-room".to_string());
        room.expect_claim_session().never();
        room.expect_publish_data().never();

        let mut session = VoiceSession::new(&config()).unwrap();
        let err = session.start(Arc::new(room)).await.unwrap_err();
        assert!(matches!(err, SessionError::Room(RoomError::NotConnected(_))));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(matches!(
            session.say("hello").await,
            Err(SessionError::NotReady {
                state: SessionState::Failed
            })
        ));
    }

    #[tokio::test]
    async fn failed_announcement_releases_the_room() {
        let mut room = MockRoom::new();
        room.expect_is_connected().return_const(true);
        room.expect_claim_session().times(1).returning(|_| Ok(()));
        room.expect_publish_data()
            .withf(|topic, _| topic == SESSION_TOPIC)
            .times(1)
            .returning(|topic, _| {
                Err(RoomError::Publish {
                    topic: topic.to_string(),
                    reason: "data channel closed".to_string(),
                })
            });
        room.expect_release_session().times(1).return_const(());

        let mut session = VoiceSession::new(&config()).unwrap();
        let err = session.start(Arc::new(room)).await.unwrap_err();
        assert!(matches!(err, SessionError::Room(RoomError::Publish { .. })));
    }

    #[tokio::test]
    async fn say_hands_exactly_one_utterance_to_tts() {
        let room = Arc::new(FakeRoom::connected("exam-room"));
        let mut session = VoiceSession::new(&config()).unwrap();
        session.start(room.clone()).await.unwrap();

        let text = "Hello, can you hear me? I am the test agent.";
        let utterance = session.say(text).await.unwrap();
        session.close().await;

        let spoken = room.published(SPEECH_TOPIC);
        assert_eq!(spoken.len(), 1);
        let body: serde_json::Value = serde_json::from_str(&spoken[0]).unwrap();
        assert_eq!(body["text"], text);
        assert_eq!(body["tts"], "provider/voice-id");
        assert_eq!(body["utterance_id"], utterance.id.to_string());
    }

    #[tokio::test]
    async fn close_ends_session_and_frees_room() {
        let room = Arc::new(FakeRoom::connected("exam-room"));
        let mut session = VoiceSession::new(&config()).unwrap();
        session.start(room.clone()).await.unwrap();
        session.close().await;

        assert_eq!(session.state(), SessionState::Ended);
        assert_eq!(room.active_session(), None);
        assert!(matches!(
            session.say("still there?").await,
            Err(SessionError::NotReady {
                state: SessionState::Ended
            })
        ));
    }

    #[tokio::test]
    async fn say_after_room_disconnect_ends_session() {
        let room = Arc::new(FakeRoom::connected("exam-room"));
        let mut session = VoiceSession::new(&config()).unwrap();
        session.start(room.clone()).await.unwrap();

        room.disconnect().await.unwrap();
        let err = session.say("hello?").await.unwrap_err();

        assert!(matches!(
            err,
            SessionError::NotReady {
                state: SessionState::Ended
            }
        ));
        assert_eq!(session.state(), SessionState::Ended);
        assert_eq!(room.active_session(), None);
        session.close().await;
        assert!(room.published(SPEECH_TOPIC).is_empty());
    }

    #[tokio::test]
    async fn dropping_a_session_frees_room() {
        let room = Arc::new(FakeRoom::connected("exam-room"));
        let mut session = VoiceSession::new(&config()).unwrap();
        session.start(room.clone()).await.unwrap();
        drop(session);
        assert_eq!(room.active_session(), None);
    }

    #[tokio::test]
    async fn empty_utterance_is_rejected() {
        let room = Arc::new(FakeRoom::connected("exam-room"));
        let mut session = VoiceSession::new(&config()).unwrap();
        session.start(room).await.unwrap();
        assert!(matches!(
            session.say("   ").await,
            Err(SessionError::EmptyUtterance)
        ));
    }

    #[test]
    fn malformed_provider_fails_construction() {
        let mut bad = config();
        bad.llm_provider = "gpt-4o".to_string();
        assert!(matches!(
            VoiceSession::new(&bad),
            Err(SessionError::Provider(ProviderError::Malformed { .. }))
        ));
    }
}
