use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::{
    sync::{Arc, LazyLock},
    time::Duration,
};
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::{debug, error, info};

use super::{
    bridge::{self, BridgeMetadata, TrackSearch},
    Resolver, SourceKind, Track,
};
use crate::error::ResolutionError;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_URL: &str = "https://api.spotify.com/v1";

/// Los tokens viven una hora; se renuevan antes de que caduquen
pub const TOKEN_REFRESH_INTERVAL: Duration = Duration::from_secs(50 * 60);

static TRACK_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:spotify:track:|/track/)([A-Za-z0-9]+)").expect("spotify track regex")
});

static COLLECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:spotify:|/)(playlist|album|artist|show|episode|user)[:/]").expect("spotify collection regex")
});

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    name: String,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
    #[serde(default)]
    duration_ms: u64,
    album: Option<SpotifyAlbum>,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyAlbum {
    #[serde(default)]
    images: Vec<SpotifyImage>,
}

#[derive(Debug, Deserialize)]
struct SpotifyImage {
    url: String,
}

impl SpotifyTrack {
    fn into_metadata(self) -> BridgeMetadata {
        let artist = self
            .artists
            .into_iter()
            .map(|a| a.name)
            .collect::<Vec<_>>()
            .join(", ");

        // Las imágenes vienen ordenadas de mayor a menor tamaño
        let artwork = self
            .album
            .and_then(|album| album.images.into_iter().next())
            .map(|image| image.url);

        BridgeMetadata::new(self.name, artist)
            .with_duration_secs(self.duration_ms / 1000)
            .with_artwork(artwork)
    }
}

/// Token de aplicación (client credentials) compartido por todas las peticiones
pub struct SpotifyTokenManager {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: RwLock<Option<String>>,
}

impl SpotifyTokenManager {
    pub fn new(http: reqwest::Client, client_id: String, client_secret: String) -> Self {
        Self {
            http,
            client_id,
            client_secret,
            token: RwLock::new(None),
        }
    }

    /// Token actual, pidiéndolo si todavía no existe
    pub async fn access_token(&self) -> Result<String, ResolutionError> {
        if let Some(token) = self.token.read().await.as_ref() {
            return Ok(token.clone());
        }
        self.refresh().await
    }

    /// Solicita un token nuevo y reemplaza el anterior
    pub async fn refresh(&self) -> Result<String, ResolutionError> {
        let response: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        *self.token.write().await = Some(response.access_token.clone());
        debug!("🔑 Token de Spotify renovado");

        Ok(response.access_token)
    }

    /// Renueva el token cada [`TOKEN_REFRESH_INTERVAL`], independientemente del tráfico
    pub fn spawn_refresh_task(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TOKEN_REFRESH_INTERVAL);
            loop {
                interval.tick().await;
                if let Err(e) = self.refresh().await {
                    error!("❌ No se pudo renovar el token de Spotify: {}", e);
                }
            }
        })
    }
}

/// Extrae el ID de un track desde una URL o URI de Spotify
pub fn parse_track_id(input: &str) -> Option<String> {
    TRACK_ID
        .captures(input)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub struct SpotifyResolver {
    http: reqwest::Client,
    tokens: Option<Arc<SpotifyTokenManager>>,
    search: Arc<dyn TrackSearch>,
}

impl SpotifyResolver {
    pub fn new(
        http: reqwest::Client,
        tokens: Option<Arc<SpotifyTokenManager>>,
        search: Arc<dyn TrackSearch>,
    ) -> Self {
        Self { http, tokens, search }
    }

    /// Sigue los enlaces cortos (spotify.link) hasta la URL canónica
    async fn canonical_url(&self, input: &str) -> Result<String, ResolutionError> {
        if !input.contains("spotify.link/") {
            return Ok(input.to_string());
        }

        let response = self.http.get(input).send().await?;
        let resolved = response.url().to_string();
        debug!("🔗 Enlace corto de Spotify: {} → {}", input, resolved);
        Ok(resolved)
    }
}

#[async_trait]
impl Resolver for SpotifyResolver {
    fn is_non_playable(&self, url: &str) -> bool {
        COLLECTION.is_match(url)
    }

    async fn resolve(&self, input: &str) -> Result<Track, ResolutionError> {
        let tokens = self.tokens.as_ref().ok_or(ResolutionError::NotConfigured {
            kind: SourceKind::SpotifyBridge,
        })?;

        let url = self.canonical_url(input).await?;
        if self.is_non_playable(&url) {
            return Err(ResolutionError::UnsupportedCollection {
                kind: SourceKind::SpotifyBridge,
            });
        }

        let id = parse_track_id(&url).ok_or_else(|| ResolutionError::InvalidUrl {
            kind: SourceKind::SpotifyBridge,
            url: url.clone(),
        })?;

        info!("🎧 Consultando track de Spotify: {}", id);

        let token = tokens.access_token().await?;
        let track: SpotifyTrack = self
            .http
            .get(format!("{}/tracks/{}", API_URL, id))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        bridge::finish(
            self.search.as_ref(),
            SourceKind::SpotifyBridge,
            &url,
            track.into_metadata(),
        )
        .await
    }
}
