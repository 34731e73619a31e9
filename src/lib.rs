//! # Guild Player
//!
//! Queued music playback for Discord voice channels, one independent session
//! per guild.
//!
//! - [`audio`]: queue, skip votes, session controller, registry and the
//!   Songbird-backed sink
//! - [`sources`]: yt-dlp resolution, Spotify catalog lookup, bulk import
//! - [`bot`]: prefix chat commands over serenity
//! - [`ui`]: embeds shown in the text channel

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod ui;
