use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use super::CatalogLookup;
use crate::error::{Result, SessionError};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";
/// Margen para renovar el token antes de que expire
const TOKEN_SLACK: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogRef {
    Track(String),
    Album(String),
    Playlist(String),
}

impl CatalogRef {
    /// Acepta `https://open.spotify.com/{tipo}/{id}` (con o sin `intl-xx`)
    /// y `spotify:{tipo}:{id}`.
    pub fn parse(reference: &str) -> Option<Self> {
        let reference = reference.trim();

        let (kind, id) = if let Some(rest) = reference.strip_prefix("spotify:") {
            let mut parts = rest.split(':');
            (parts.next()?.to_string(), parts.next()?.to_string())
        } else {
            let url = Url::parse(reference).ok()?;
            if url.host_str() != Some("open.spotify.com") {
                return None;
            }
            let mut segments = url
                .path_segments()?
                .filter(|segment| !segment.is_empty() && !segment.starts_with("intl-"));
            (segments.next()?.to_string(), segments.next()?.to_string())
        };

        if id.is_empty() {
            return None;
        }

        match kind.as_str() {
            "track" => Some(CatalogRef::Track(id)),
            "album" => Some(CatalogRef::Album(id)),
            "playlist" => Some(CatalogRef::Playlist(id)),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    name: String,
    #[serde(default)]
    artists: Vec<Artist>,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: String,
}

impl SpotifyTrack {
    /// "<primer artista> <nombre>", la consulta que se busca en YouTube
    fn search_query(&self) -> String {
        match self.artists.first() {
            Some(artist) => format!("{} {}", artist.name, self.name),
            None => self.name.clone(),
        }
    }
}

/// Agrega consultas hasta llenar `max`; devuelve `true` si se llenó
fn take_queries<T>(
    items: Vec<T>,
    to_query: impl Fn(T) -> Option<String>,
    out: &mut Vec<String>,
    max: usize,
) -> bool {
    for item in items {
        if out.len() >= max {
            return true;
        }
        if let Some(query) = to_query(item) {
            out.push(query);
        }
    }
    out.len() >= max
}

/// Cliente de la Web API de Spotify (client credentials)
pub struct SpotifyCatalog {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    max_items: usize,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyCatalog {
    pub fn new(client_id: String, client_secret: String, max_items: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id,
            client_secret,
            max_items,
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        debug!("🔑 Solicitando token de Spotify");
        let response: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(catalog_error)?
            .json()
            .await
            .map_err(catalog_error)?;

        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(TOKEN_SLACK);
        *cached = Some(CachedToken {
            value: response.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(response.access_token)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let token = self.access_token().await?;
        self.http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(catalog_error)?
            .json()
            .await
            .map_err(catalog_error)
    }

    /// Sigue la paginación (`next`) hasta agotar la lista o llegar al máximo
    async fn collect_pages<T: DeserializeOwned>(
        &self,
        first_page: String,
        to_query: impl Fn(T) -> Option<String>,
    ) -> Result<Vec<String>> {
        let mut queries = Vec::new();
        let mut next = Some(first_page);

        while let Some(url) = next.take() {
            let page: Page<T> = self.get_json(&url).await?;
            if take_queries(page.items, &to_query, &mut queries, self.max_items) {
                break;
            }
            next = page.next;
        }

        Ok(queries)
    }
}

fn catalog_error(e: reqwest::Error) -> SessionError {
    SessionError::Catalog(e.to_string())
}

#[async_trait]
impl CatalogLookup for SpotifyCatalog {
    fn handles(&self, reference: &str) -> bool {
        CatalogRef::parse(reference).is_some()
    }

    async fn expand(&self, reference: &str) -> Result<Vec<String>> {
        let catalog_ref = CatalogRef::parse(reference)
            .ok_or_else(|| SessionError::Catalog(format!("referencia de Spotify inválida: {reference}")))?;

        let queries = match catalog_ref {
            CatalogRef::Track(id) => {
                let track: SpotifyTrack = self.get_json(&format!("{API_BASE}/tracks/{id}")).await?;
                vec![track.search_query()]
            }
            CatalogRef::Album(id) => {
                self.collect_pages(format!("{API_BASE}/albums/{id}/tracks?limit=50"), |track: SpotifyTrack| {
                    Some(track.search_query())
                })
                .await?
            }
            CatalogRef::Playlist(id) => {
                self.collect_pages(
                    format!("{API_BASE}/playlists/{id}/tracks?limit=100"),
                    |item: PlaylistItem| item.track.map(|track| track.search_query()),
                )
                .await?
            }
        };

        info!("📋 Spotify devolvió {} canciones para {}", queries.len(), reference);
        Ok(queries)
    }
}
