//! Core of the proctor voice harness: the pieces needed to stand up one
//! realtime voice session, verify room connectivity and create an avatar
//! session. Transport and provider backends stay behind traits and wire
//! contracts; this crate owns sequencing, state and error reporting.

pub mod avatar;
pub mod job;
pub mod probe;
pub mod provider;
pub mod room;
pub mod session;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use job::{JobContext, JobError, JobOutcome, handle_greeting_job, start_session};
pub use room::{Room, RoomError, RoomGuard, SessionSlot};
pub use session::{SessionConfig, SessionError, SessionState, VoiceSession};
