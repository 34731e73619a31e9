//! # Audio Module
//!
//! Per-guild playback core of the bot.
//!
//! ## Architecture
//!
//! ### [`track`] - Tracks
//! - A resolved audio source plus who requested it
//! - Dropping a track releases its audio
//!
//! ### [`queue`] - Queue Management
//! - FIFO with indexed removal, shuffle and paging
//!
//! ### [`skip_votes`] - Vote Skipping
//! - Three distinct listeners, or the requester alone, skip a track
//!
//! ### [`session`] - Session Controller
//! - Owns queue, votes, loop and volume flags of one voice session
//! - Runs the playback loop that feeds the sink one track at a time
//!
//! ### [`registry`] - Session Registry
//! - One controller per guild, created on demand, torn down on leave
//!
//! ### [`sink`] / [`songbird_sink`] - Audio Transport
//! - The contract the loop plays through, and its Songbird implementation
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use guild_player::audio::{
//!     registry::SessionRegistry,
//!     session::{SessionController, SessionSettings},
//!     songbird_sink::SongbirdSink,
//! };
//! use guild_player::sources::{ytdlp::YtDlpResolver, SourceResolver};
//! use serenity::all::{ChannelId, GuildId, UserId};
//! use std::sync::Arc;
//!
//! # async fn example(manager: Arc<songbird::Songbird>) -> guild_player::error::Result<()> {
//! let registry: SessionRegistry<GuildId, SongbirdSink> = SessionRegistry::new();
//! let guild_id = GuildId::new(123456789);
//!
//! let session = registry
//!     .get_or_create(guild_id, || async {
//!         let sink = SongbirdSink::connect(manager, guild_id, ChannelId::new(42)).await?;
//!         Ok(SessionController::spawn(guild_id.to_string(), sink, SessionSettings::default()))
//!     })
//!     .await?;
//!
//! let track = YtDlpResolver::new().resolve("never gonna give you up", UserId::new(1)).await?;
//! session.enqueue(track)?;
//! # Ok(())
//! # }
//! ```

pub mod queue;
pub mod registry;
pub mod session;
pub mod sink;
pub mod skip_votes;
pub mod songbird_sink;
pub mod track;

#[cfg(test)]
pub(crate) mod testing;
