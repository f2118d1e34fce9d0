//! The realtime room abstraction.
//!
//! A `Room` is one connection to the realtime service. The transport itself
//! lives behind this trait (see the `livekit-signal` crate); everything in
//! this crate only needs to connect, disconnect, publish data and claim the
//! room for a single voice session.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },
    #[error("room '{0}' is not connected")]
    NotConnected(String),
    #[error("room '{room}' already has an active voice session ({active})")]
    SessionAlreadyActive { room: String, active: Uuid },
    #[error("failed to publish on topic '{topic}': {reason}")]
    Publish { topic: String, reason: String },
    #[error("failed to disconnect cleanly: {0}")]
    Disconnect(String),
}

/// A connection to one realtime room.
///
/// `disconnect` must be safe to call when `connect` failed or was never
/// called; it releases whatever part of the connection exists.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Room: Send + Sync {
    /// The room name, used for logging.
    fn name(&self) -> &str;

    fn is_connected(&self) -> bool;

    async fn connect(&self, url: &str, token: &str) -> Result<(), RoomError>;

    async fn disconnect(&self) -> Result<(), RoomError>;

    /// Sends a reliable data message to the room on `topic`.
    async fn publish_data(&self, topic: &str, payload: String) -> Result<(), RoomError>;

    /// Marks `session_id` as the room's active voice session. Fails if a
    /// different session already holds the room.
    fn claim_session(&self, session_id: Uuid) -> Result<(), RoomError>;

    /// Releases the claim if `session_id` holds it.
    fn release_session(&self, session_id: Uuid);
}

/// Tracks the single voice session allowed per room.
///
/// Room implementations embed one of these to implement
/// [`Room::claim_session`] and [`Room::release_session`].
#[derive(Debug, Default)]
pub struct SessionSlot {
    active: Mutex<Option<Uuid>>,
}

impl SessionSlot {
    pub fn claim(&self, room: &str, session_id: Uuid) -> Result<(), RoomError> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        match *active {
            Some(current) => Err(RoomError::SessionAlreadyActive {
                room: room.to_string(),
                active: current,
            }),
            None => {
                *active = Some(session_id);
                Ok(())
            }
        }
    }

    pub fn release(&self, session_id: Uuid) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if *active == Some(session_id) {
            *active = None;
        }
    }

    pub fn active(&self) -> Option<Uuid> {
        *self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Owns the "must disconnect" obligation for a room. If dropped while still
/// armed, the disconnect is spawned onto the runtime.
pub struct RoomGuard {
    room: Option<Arc<dyn Room>>,
}

impl RoomGuard {
    pub fn arm(room: Arc<dyn Room>) -> Self {
        Self { room: Some(room) }
    }

    pub async fn release(mut self) -> Result<(), RoomError> {
        match self.room.take() {
            Some(room) => room.disconnect().await,
            None => Ok(()),
        }
    }
}

impl Drop for RoomGuard {
    fn drop(&mut self) {
        let Some(room) = self.room.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = room.disconnect().await {
                        warn!(room = %room.name(), error = %e, "Disconnect after cancellation failed.");
                    }
                });
            }
            Err(_) => warn!(room = %room.name(), "No runtime available; connection leaked."),
        }
    }
}
