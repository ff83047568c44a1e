use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

use super::{
    bridge::{self, BridgeMetadata, TrackSearch},
    Resolver, SourceKind, Track,
};
use crate::error::ResolutionError;

const API_URL: &str = "https://api.deezer.com";

static TRACK_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"deezer\.com/(?:[a-z]{2}/)?track/(\d+)").expect("deezer track regex"));

static COLLECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"deezer\.com/(?:[a-z]{2}/)?(album|playlist|artist|show|profile)/").expect("deezer collection regex")
});

#[derive(Debug, Deserialize)]
struct DeezerTrack {
    title: Option<String>,
    #[serde(default)]
    duration: u64,
    artist: Option<DeezerArtist>,
    album: Option<DeezerAlbum>,
    error: Option<DeezerError>,
}

#[derive(Debug, Deserialize)]
struct DeezerArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct DeezerAlbum {
    cover_xl: Option<String>,
    cover_big: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeezerError {
    message: Option<String>,
}

impl DeezerTrack {
    fn into_metadata(self) -> Result<BridgeMetadata, ResolutionError> {
        // La API responde 200 con un objeto `error` para IDs inexistentes
        if let Some(error) = self.error {
            return Err(ResolutionError::MissingMetadata {
                kind: SourceKind::DeezerBridge,
                reason: error.message.unwrap_or_else(|| "error de la API".to_string()),
            });
        }

        let artwork = self.album.and_then(|album| album.cover_xl.or(album.cover_big));

        Ok(BridgeMetadata::new(
            self.title.unwrap_or_default(),
            self.artist.map(|a| a.name).unwrap_or_default(),
        )
        .with_duration_secs(self.duration)
        .with_artwork(artwork))
    }
}

pub fn parse_track_id(url: &str) -> Option<String> {
    TRACK_ID
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn is_short_link(url: &str) -> bool {
    url.contains("deezer.page.link/") || url.contains("link.deezer.com/")
}

pub struct DeezerResolver {
    http: reqwest::Client,
    search: Arc<dyn TrackSearch>,
}

impl DeezerResolver {
    pub fn new(http: reqwest::Client, search: Arc<dyn TrackSearch>) -> Self {
        Self { http, search }
    }

    /// Sigue la redirección de los enlaces cortos
    async fn canonical_url(&self, input: &str) -> Result<String, ResolutionError> {
        if !is_short_link(input) {
            return Ok(input.to_string());
        }

        let response = self.http.get(input).send().await?;
        let resolved = response.url().to_string();
        debug!("🔗 Enlace corto de Deezer: {} → {}", input, resolved);
        Ok(resolved)
    }
}

#[async_trait]
impl Resolver for DeezerResolver {
    fn is_non_playable(&self, url: &str) -> bool {
        COLLECTION.is_match(url)
    }

    async fn resolve(&self, input: &str) -> Result<Track, ResolutionError> {
        let url = self.canonical_url(input).await?;
        if self.is_non_playable(&url) {
            return Err(ResolutionError::UnsupportedCollection {
                kind: SourceKind::DeezerBridge,
            });
        }

        let id = parse_track_id(&url).ok_or_else(|| ResolutionError::InvalidUrl {
            kind: SourceKind::DeezerBridge,
            url: url.clone(),
        })?;

        info!("🎶 Consultando track de Deezer: {}", id);

        let track: DeezerTrack = self
            .http
            .get(format!("{}/track/{}", API_URL, id))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        bridge::finish(self.search.as_ref(), SourceKind::DeezerBridge, &url, track.into_metadata()?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::bridge::tests::FakeSearch;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_track_id() {
        assert_eq!(
            parse_track_id("https://www.deezer.com/en/track/3135556?utm_source=x"),
            Some("3135556".to_string())
        );
        assert_eq!(parse_track_id("https://deezer.com/track/42"), Some("42".to_string()));
        assert_eq!(parse_track_id("https://www.deezer.com/album/302127"), None);
    }

    #[test]
    fn test_collections_are_not_playable() {
        let resolver = DeezerResolver::new(reqwest::Client::new(), Arc::new(FakeSearch::default()));

        assert!(resolver.is_non_playable("https://www.deezer.com/en/album/302127"));
        assert!(resolver.is_non_playable("https://www.deezer.com/playlist/908622995"));
        assert!(resolver.is_non_playable("https://www.deezer.com/fr/artist/27"));
        assert!(!resolver.is_non_playable("https://www.deezer.com/en/track/3135556"));
    }

    #[test]
    fn test_short_links() {
        assert!(is_short_link("https://deezer.page.link/abcDEF"));
        assert!(is_short_link("https://link.deezer.com/s/30Wx"));
        assert!(!is_short_link("https://www.deezer.com/track/1"));
    }

    #[test]
    fn test_api_response_mapping() {
        let track: DeezerTrack = serde_json::from_str(
            r#"{"id":3135556,"title":"Harder, Better, Faster, Stronger","duration":224,
                "artist":{"id":27,"name":"Daft Punk"},
                "album":{"cover_big":"https://e-cdns/big.jpg","cover_xl":"https://e-cdns/xl.jpg"}}"#,
        )
        .unwrap();

        let metadata = track.into_metadata().unwrap();
        assert_eq!(metadata.title, "Harder, Better, Faster, Stronger");
        assert_eq!(metadata.artist, "Daft Punk");
        assert_eq!(metadata.duration_secs, Some(224));
        assert_eq!(metadata.artwork_url.as_deref(), Some("https://e-cdns/xl.jpg"));
    }

    #[test]
    fn test_api_error_object() {
        let track: DeezerTrack = serde_json::from_str(
            r#"{"error":{"type":"DataException","message":"no data","code":800}}"#,
        )
        .unwrap();

        assert!(matches!(
            track.into_metadata(),
            Err(ResolutionError::MissingMetadata { .. })
        ));
    }
}
