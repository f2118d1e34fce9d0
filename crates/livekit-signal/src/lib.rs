//! Realtime room transport for the proctor voice harness.
//!
//! - `room`: the signalling WebSocket connection, implementing
//!   [`proctor_core::Room`].
//! - `token`: HS256 access tokens for joining a room from an API key pair.

pub mod room;
pub mod token;

pub use room::{SignalRoom, signal_url};
pub use token::{AccessToken, TokenError, VideoGrants};
