use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};

use crate::{audio::session::SessionSettings, sources::ytdlp::DEFAULT_RESOLVE_TIMEOUT};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Audio
    pub default_volume: f32,
    pub skip_vote_threshold: usize,
    pub stop_grace_ms: u64,

    // Cola
    pub queue_page_size: usize,
    pub max_playlist_size: usize,

    // Fuentes
    pub resolve_timeout_secs: u64,

    // APIs (opcionales)
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::from_filename("env/.env").ok();
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Validar antes de devolver
        config.validate()?;

        Ok(config)
    }

    /// Construye la configuración a partir de una función de búsqueda de variables
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            // Discord
            discord_token: lookup("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            command_prefix: lookup("COMMAND_PREFIX")
                .filter(|p| !p.trim().is_empty())
                .unwrap_or(defaults.command_prefix),

            // Audio
            default_volume: parse_var(&lookup, "DEFAULT_VOLUME", defaults.default_volume)?,
            skip_vote_threshold: parse_var(&lookup, "SKIP_VOTE_THRESHOLD", defaults.skip_vote_threshold)?,
            stop_grace_ms: parse_var(&lookup, "STOP_GRACE_MS", defaults.stop_grace_ms)?,

            // Cola
            queue_page_size: parse_var(&lookup, "QUEUE_PAGE_SIZE", defaults.queue_page_size)?,
            max_playlist_size: parse_var(&lookup, "MAX_PLAYLIST_SIZE", defaults.max_playlist_size)?,

            // Fuentes
            resolve_timeout_secs: parse_var(&lookup, "RESOLVE_TIMEOUT_SECS", defaults.resolve_timeout_secs)?,

            // APIs
            spotify_client_id: lookup("SPOTIFY_CLIENT_ID").filter(|v| !v.is_empty()),
            spotify_client_secret: lookup("SPOTIFY_CLIENT_SECRET").filter(|v| !v.is_empty()),
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// - Volume must be between 0.0 and 1.0
    /// - Vote threshold, page size, playlist cap and resolve timeout must be greater than 0
    /// - The token must not be empty
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("Discord token must not be empty");
        }

        if !(0.0..=1.0).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 1.0, got: {}", self.default_volume);
        }

        if self.skip_vote_threshold == 0 {
            anyhow::bail!("Skip vote threshold must be greater than 0");
        }

        if self.queue_page_size == 0 {
            anyhow::bail!("Queue page size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.resolve_timeout_secs == 0 {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        if self.spotify_client_id.is_some() != self.spotify_client_secret.is_some() {
            anyhow::bail!("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set together");
        }

        Ok(())
    }

    /// Credenciales de Spotify, si ambas están presentes
    pub fn spotify_credentials(&self) -> Option<(String, String)> {
        match (&self.spotify_client_id, &self.spotify_client_secret) {
            (Some(id), Some(secret)) => Some((id.clone(), secret.clone())),
            _ => None,
        }
    }

    /// Ajustes que recibe cada sesión de reproducción
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            default_volume: self.default_volume,
            skip_threshold: self.skip_vote_threshold,
            page_size: self.queue_page_size,
            stop_grace: Duration::from_millis(self.stop_grace_ms),
        }
    }

    /// Tiempo máximo para resolver una búsqueda con yt-dlp
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Never includes the Discord token or Spotify secrets.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: prefix '{}'\n  \
            Audio: {}% vol, {} votes to skip, {}ms stop grace\n  \
            Queue: {} per page, {} max playlist tracks\n  \
            Sources: {}s resolve timeout\n  \
            Spotify: {}",
            self.command_prefix,
            (self.default_volume * 100.0).round() as u32,
            self.skip_vote_threshold,
            self.stop_grace_ms,
            self.queue_page_size,
            self.max_playlist_size,
            self.resolve_timeout_secs,
            if self.spotify_credentials().is_some() { "enabled" } else { "disabled" }
        )
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .with_context(|| format!("{key} tiene un valor inválido: {value}")),
        _ => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        let session = SessionSettings::default();
        Self {
            // Discord (el token no tiene valor por defecto)
            discord_token: String::new(),
            command_prefix: "!".to_string(),

            // Audio
            default_volume: session.default_volume,
            skip_vote_threshold: session.skip_threshold,
            stop_grace_ms: session.stop_grace.as_millis() as u64,

            // Cola
            queue_page_size: session.page_size,
            max_playlist_size: 50,

            resolve_timeout_secs: DEFAULT_RESOLVE_TIMEOUT.as_secs(),

            spotify_client_id: None,
            spotify_client_secret: None,
        }
    }
}
