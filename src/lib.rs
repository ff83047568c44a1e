//! # Open Jukebox
//!
//! Per-guild audio playback orchestrator for Discord.
//!
//! - [`sources`]: detects where a query points to and resolves it into a [`sources::Track`]
//! - [`audio`]: stream factory, per-guild playback engine and the session registry
//! - [`bot`]: serenity/songbird adapter wiring slash commands and voice to the engine
//! - [`storage`]: JSON-backed guild settings and saved playlists

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod storage;
pub mod ui;
