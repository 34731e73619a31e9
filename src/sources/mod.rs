//! Collaborators that turn user input into playable tracks.
//!
//! - [`SourceResolver`]: a search string or URL becomes one [`Track`]
//! - [`CatalogLookup`]: a playlist/album reference becomes an ordered list of
//!   search strings, later resolved one by one by [`import`]

pub mod import;
pub mod spotify;
pub mod ytdlp;

use async_trait::async_trait;
use serenity::model::id::UserId;

use crate::{
    audio::track::{AudioSource, Track},
    error::Result,
};

pub use spotify::SpotifyCatalog;
pub use ytdlp::{YtDlpResolver, YtDlpSource};

/// Resuelve una consulta a un track reproducible
#[async_trait]
pub trait SourceResolver: Send + Sync {
    type Source: AudioSource;

    /// Failures are reported as [`SessionError::Resolution`].
    ///
    /// [`SessionError::Resolution`]: crate::error::SessionError::Resolution
    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Track<Self::Source>>;
}

/// Expande playlists y álbumes a consultas individuales
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    /// Verifica si la referencia pertenece a este catálogo
    fn handles(&self, reference: &str) -> bool;

    /// Ordered search strings, already capped by the implementation.
    async fn expand(&self, reference: &str) -> Result<Vec<String>>;
}
