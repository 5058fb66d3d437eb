//! # Audio Module
//!
//! Per-guild playback orchestration.
//!
//! ## Architecture
//!
//! ### [`registry`] - Player Registry
//! - One [`player::GuildPlayer`] per guild, created on first use
//! - Players remove themselves when they tear down
//!
//! ### [`player`] - Guild Player
//! - FIFO [`queue`] drained by a single loop task
//! - Idle timeout, skip, pause/resume, snapshots
//! - Releases every [`track`] stream exactly once
//!
//! ### [`engine`] - Voice transport
//! - [`engine::VoiceConnection`] seam with a songbird implementation
//! - Completion reported through a [`signal::CompletionSignal`]
//!
//! ### [`service`] - Command façade
//! - Voice-channel check, resolution, join/move and enqueue in one call
//!
//! Presentation is pushed out through [`events::PlayerEvents`]; nothing in
//! this module formats a Discord message.

pub mod engine;
pub mod events;
pub mod player;
pub mod queue;
pub mod registry;
pub mod service;
pub mod signal;
pub mod track;

#[cfg(test)]
pub mod testing;
