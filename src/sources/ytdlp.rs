use async_trait::async_trait;
use serenity::model::id::UserId;
use songbird::input::{Compose, Input, YoutubeDl};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};
use url::Url;

use super::SourceResolver;
use crate::{
    audio::track::{AudioSource, Track, TrackInfo},
    error::{Result, SessionError},
};

pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Audio perezoso de yt-dlp: solo guarda la URL hasta que el sink lo reproduce
#[derive(Debug, Clone)]
pub struct YtDlpSource {
    client: reqwest::Client,
    url: String,
}

impl YtDlpSource {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Crea el Input de Songbird; yt-dlp se ejecuta recién al reproducir
    pub fn into_input(self) -> Input {
        let ytdl = YoutubeDl::new(self.client, self.url);
        Input::from(ytdl)
    }
}

impl AudioSource for YtDlpSource {
    // Repetir vuelve a pedir el stream a partir de la URL canónica
    fn reopen(&self) -> Option<Self> {
        Some(self.clone())
    }
}

/// Resuelve búsquedas y URLs con yt-dlp a través de Songbird
pub struct YtDlpResolver {
    client: reqwest::Client,
    timeout: Duration,
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl YtDlpResolver {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Las URLs se pasan tal cual; el resto se busca en YouTube
pub fn search_target(query: &str) -> String {
    match Url::parse(query) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => query.to_string(),
        _ => format!("ytsearch1:{query}"),
    }
}

#[async_trait]
impl SourceResolver for YtDlpResolver {
    type Source = YtDlpSource;

    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Track<YtDlpSource>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SessionError::Resolution("consulta vacía".to_string()));
        }

        let target = search_target(query);
        info!("🔍 Resolviendo: {}", target);

        let mut ytdl = YoutubeDl::new(self.client.clone(), target.clone());
        let metadata = match timeout(self.timeout, ytdl.aux_metadata()).await {
            Ok(Ok(metadata)) => metadata,
            Ok(Err(e)) => {
                warn!("❌ yt-dlp falló para {}: {}", query, e);
                return Err(SessionError::Resolution(format!("{query}: {e}")));
            }
            Err(_) => {
                warn!("⏰ Timeout resolviendo {}", query);
                return Err(SessionError::Resolution(format!("{query}: tiempo de espera agotado")));
            }
        };

        let url = metadata.source_url.clone().unwrap_or(target);
        let title = metadata.title.clone().unwrap_or_else(|| query.to_string());

        let mut info = TrackInfo::new(title, requested_by).with_url(url.clone());
        if let Some(duration) = metadata.duration {
            info = info.with_duration(duration);
        }

        info!("✅ Resuelto: {} ({})", info.title, url);
        Ok(Track::new(info, YtDlpSource::new(self.client.clone(), url)))
    }
}
