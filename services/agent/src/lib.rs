//! Proctor Agent Service
//!
//! Configuration, logging and job hosting for the three entry points in
//! `bin/`: the voice agent, the avatar session requester and the
//! connectivity probe.

pub mod config;
pub mod telemetry;
pub mod worker;
