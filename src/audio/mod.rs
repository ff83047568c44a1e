//! # Audio Module
//!
//! Per-guild playback engine for Open Jukebox.
//!
//! ## Architecture
//!
//! ### [`stream`] - Stream Factory
//! - Picks the decode backend (`yt-dlp` or `ffmpeg`) for a track
//! - Waits for the first bytes within a startup timeout
//! - Replays the first chunk through a relay so nothing is lost
//!
//! ### [`session`] - Session Engine
//! - One actor task per guild, fed through a command channel
//! - Bounded FIFO queue, loop, pause, volume and vote skip
//! - Idle watchdog that tears the session down when nothing is queued
//!
//! ### [`registry`] - Session Registry
//! - Creates, looks up and destroys sessions keyed by guild
//!
//! The engine reaches Discord only through the traits in [`transport`].

pub mod playlist;
pub mod queue;
pub mod registry;
pub mod session;
pub mod stream;
pub mod transport;
pub mod watchdog;


pub use registry::SessionRegistry;
pub use session::{
    AddOutcome, ControlAction, ControlOutcome, DestroyReason, SessionHandle, SessionSettings,
    SessionSnapshot, SessionState, SettingKey, SettingsProvider, VoteOutcome,
};
