//! Connectivity Probe
//!
//! Connects to a realtime room with a pre-issued token, holds the connection
//! for a while, then disconnects. Disconnect runs exactly once on every exit
//! path: after a normal hold, after an early shutdown, after a failed (and
//! possibly half-open) connect, and when the probe future is dropped
//! mid-hold.

use crate::room::{Room, RoomError, RoomGuard};
use secrecy::{ExposeSecret, SecretString};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Hold used when none is configured.
pub const DEFAULT_HOLD: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("connection failed: {0}")]
    Connection(#[source] RoomError),
    #[error("disconnect failed: {0}")]
    Disconnect(#[source] RoomError),
}

#[derive(Debug)]
pub struct ConnectivityProbe {
    pub room_url: String,
    pub token: SecretString,
    pub hold: Duration,
}

/// What happened during a successful probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub room: String,
    pub held: Duration,
    /// The hold ended early because of a shutdown request.
    pub interrupted: bool,
}

impl ConnectivityProbe {
    pub fn new(room_url: impl Into<String>, token: SecretString, hold: Duration) -> Self {
        Self {
            room_url: room_url.into(),
            token,
            hold,
        }
    }

    /// Runs the probe against `room`. The hold ends early when `shutdown`
    /// resolves.
    pub async fn run<S>(&self, room: Arc<dyn Room>, shutdown: S) -> Result<ProbeReport, ProbeError>
    where
        S: Future<Output = ()>,
    {
        let guard = RoomGuard::arm(room.clone());

        info!(url = %self.room_url, room = %room.name(), "Connecting...");
        if let Err(e) = room.connect(&self.room_url, self.token.expose_secret()).await {
            if let Err(disconnect_err) = guard.release().await {
                warn!(error = %disconnect_err, "Cleanup after failed connect also failed.");
            }
            return Err(ProbeError::Connection(e));
        }
        info!(hold = ?self.hold, "Connected. Holding connection...");

        let started = Instant::now();
        let interrupted = tokio::select! {
            _ = tokio::time::sleep(self.hold) => false,
            _ = shutdown => {
                info!("Shutdown requested; ending hold early.");
                true
            }
        };
        let held = started.elapsed();

        guard.release().await.map_err(ProbeError::Disconnect)?;
        info!(held = ?held, "Disconnected.");

        Ok(ProbeReport {
            room: room.name().to_string(),
            held,
            interrupted,
        })
    }
}
