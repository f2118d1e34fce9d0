//! Test doubles shared between this crate's tests and downstream crates
//! (enable the `test-util` feature).

use crate::room::{Room, RoomError, SessionSlot};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use uuid::Uuid;

/// One recorded interaction with a [`FakeRoom`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomCall {
    Connect { url: String },
    Disconnect,
    Publish { topic: String, payload: String },
}

/// An in-memory `Room` that records every call in order.
#[derive(Debug)]
pub struct FakeRoom {
    name: String,
    connected: AtomicBool,
    fail_connect: bool,
    half_open_on_failure: bool,
    calls: Mutex<Vec<RoomCall>>,
    slot: SessionSlot,
    disconnected: Notify,
}

impl FakeRoom {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            connected: AtomicBool::new(false),
            fail_connect: false,
            half_open_on_failure: false,
            calls: Mutex::new(Vec::new()),
            slot: SessionSlot::default(),
            disconnected: Notify::new(),
        }
    }

    /// A room that is already connected, as handed to a job handler.
    pub fn connected(name: &str) -> Self {
        let room = Self::new(name);
        room.connected.store(true, Ordering::SeqCst);
        room
    }

    /// `connect` fails. With `half_open`, the transport is left partially
    /// established, so only `disconnect` tears it down.
    pub fn failing_connect(name: &str, half_open: bool) -> Self {
        Self {
            fail_connect: true,
            half_open_on_failure: half_open,
            ..Self::new(name)
        }
    }

    pub fn calls(&self) -> Vec<RoomCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn disconnect_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RoomCall::Disconnect))
            .count()
    }

    /// Payloads published on `topic`, in order.
    pub fn published(&self, topic: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RoomCall::Publish { topic: t, payload } if t == topic => Some(payload),
                _ => None,
            })
            .collect()
    }

    /// Resolves once `disconnect` has been called.
    pub async fn wait_for_disconnect(&self) {
        let notified = self.disconnected.notified();
        if self.disconnect_count() > 0 {
            return;
        }
        notified.await;
    }

    pub fn active_session(&self) -> Option<Uuid> {
        self.slot.active()
    }

    fn record(&self, call: RoomCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }
}

#[async_trait]
impl Room for FakeRoom {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self, url: &str, _token: &str) -> Result<(), RoomError> {
        self.record(RoomCall::Connect {
            url: url.to_string(),
        });
        if self.fail_connect {
            if self.half_open_on_failure {
                self.connected.store(true, Ordering::SeqCst);
            }
            return Err(RoomError::Connect {
                url: url.to_string(),
                reason: "signal handshake rejected".to_string(),
            });
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), RoomError> {
        self.record(RoomCall::Disconnect);
        self.connected.store(false, Ordering::SeqCst);
        self.disconnected.notify_waiters();
        Ok(())
    }

    async fn publish_data(&self, topic: &str, payload: String) -> Result<(), RoomError> {
        if !self.is_connected() {
            return Err(RoomError::NotConnected(self.name.clone()));
        }
        self.record(RoomCall::Publish {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }

    fn claim_session(&self, session_id: Uuid) -> Result<(), RoomError> {
        self.slot.claim(&self.name, session_id)
    }

    fn release_session(&self, session_id: Uuid) {
        self.slot.release(session_id);
    }
}
