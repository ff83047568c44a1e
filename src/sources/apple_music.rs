use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use tracing::info;
use url::Url;

use super::{
    bridge::{self, BridgeMetadata, TrackSearch},
    Resolver, SourceKind, Track,
};
use crate::error::ResolutionError;

const LOOKUP_URL: &str = "https://itunes.apple.com/lookup";

static SONG_PATH_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/song/(?:[^/]+/)?(\d+)").expect("apple song regex"));

static REGION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"music\.apple\.com/([a-z]{2})/").expect("apple region regex"));

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    #[serde(default)]
    results: Vec<LookupEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupEntry {
    wrapper_type: Option<String>,
    track_name: Option<String>,
    artist_name: Option<String>,
    track_time_millis: Option<u64>,
    artwork_url100: Option<String>,
}

impl LookupResponse {
    fn into_metadata(self) -> Option<BridgeMetadata> {
        let entry = self
            .results
            .into_iter()
            .find(|e| e.wrapper_type.as_deref() == Some("track") && e.track_name.is_some())?;

        // iTunes devuelve 100x100; la misma ruta sirve a 600x600
        let artwork = entry
            .artwork_url100
            .map(|url| url.replace("100x100", "600x600"));

        Some(
            BridgeMetadata::new(
                entry.track_name.unwrap_or_default(),
                entry.artist_name.unwrap_or_default(),
            )
            .with_duration_secs(entry.track_time_millis.unwrap_or(0) / 1000)
            .with_artwork(artwork),
        )
    }
}

/// ID de canción: parámetro `?i=` en enlaces de álbum o ruta `/song/.../<id>`
pub fn parse_song_id(url: &str) -> Option<String> {
    if let Ok(parsed) = Url::parse(url) {
        if let Some((_, id)) = parsed.query_pairs().find(|(k, _)| k == "i") {
            if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
                return Some(id.into_owned());
            }
        }
    }

    SONG_PATH_ID
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn parse_region(url: &str) -> String {
    REGION
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "us".to_string())
}

pub struct AppleMusicResolver {
    http: reqwest::Client,
    search: Arc<dyn TrackSearch>,
}

impl AppleMusicResolver {
    pub fn new(http: reqwest::Client, search: Arc<dyn TrackSearch>) -> Self {
        Self { http, search }
    }
}

#[async_trait]
impl Resolver for AppleMusicResolver {
    fn is_non_playable(&self, url: &str) -> bool {
        if url.contains("/playlist/") || url.contains("/artist/") || url.contains("/station/") {
            return true;
        }
        // Un álbum solo es reproducible si apunta a una canción con ?i=
        url.contains("/album/") && parse_song_id(url).is_none()
    }

    async fn resolve(&self, input: &str) -> Result<Track, ResolutionError> {
        let id = parse_song_id(input).ok_or_else(|| ResolutionError::InvalidUrl {
            kind: SourceKind::AppleMusicBridge,
            url: input.to_string(),
        })?;
        let region = parse_region(input);

        info!("🍎 Consultando iTunes: id={} región={}", id, region);

        let response: LookupResponse = self
            .http
            .get(LOOKUP_URL)
            .query(&[("id", id.as_str()), ("entity", "song"), ("country", region.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let metadata = response
            .into_metadata()
            .ok_or_else(|| ResolutionError::MissingMetadata {
                kind: SourceKind::AppleMusicBridge,
                reason: format!("iTunes no tiene la canción {}", id),
            })?;

        bridge::finish(self.search.as_ref(), SourceKind::AppleMusicBridge, input, metadata).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::bridge::tests::FakeSearch;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_song_id() {
        assert_eq!(
            parse_song_id("https://music.apple.com/us/album/get-lucky/617154241?i=617154366"),
            Some("617154366".to_string())
        );
        assert_eq!(
            parse_song_id("https://music.apple.com/gb/song/get-lucky/617154366"),
            Some("617154366".to_string())
        );
        assert_eq!(parse_song_id("https://music.apple.com/us/album/ram/617154241"), None);
    }

    #[test]
    fn test_region_from_path() {
        assert_eq!(parse_region("https://music.apple.com/mx/song/x/1"), "mx");
        assert_eq!(parse_region("https://example.com/x"), "us");
    }

    #[test]
    fn test_collections_are_not_playable() {
        let resolver = AppleMusicResolver::new(reqwest::Client::new(), Arc::new(FakeSearch::default()));

        assert!(resolver.is_non_playable("https://music.apple.com/us/album/ram/617154241"));
        assert!(resolver.is_non_playable("https://music.apple.com/us/playlist/x/pl.123"));
        assert!(resolver.is_non_playable("https://music.apple.com/us/artist/daft-punk/5468295"));
        assert!(!resolver.is_non_playable("https://music.apple.com/us/album/ram/617154241?i=617154366"));
        assert!(!resolver.is_non_playable("https://music.apple.com/us/song/get-lucky/617154366"));
    }

    #[test]
    fn test_lookup_mapping_upscales_artwork() {
        let response: LookupResponse = serde_json::from_str(
            r#"{"resultCount":2,"results":[
                {"wrapperType":"collection","collectionName":"Random Access Memories"},
                {"wrapperType":"track","trackName":"Get Lucky","artistName":"Daft Punk",
                 "trackTimeMillis":369629,"artworkUrl100":"https://is1.mzstatic.com/a/100x100bb.jpg"}
            ]}"#,
        )
        .unwrap();

        let metadata = response.into_metadata().unwrap();
        assert_eq!(metadata.title, "Get Lucky");
        assert_eq!(metadata.artist, "Daft Punk");
        assert_eq!(metadata.duration_secs, Some(369));
        assert_eq!(
            metadata.artwork_url.as_deref(),
            Some("https://is1.mzstatic.com/a/600x600bb.jpg")
        );
    }

    #[test]
    fn test_empty_lookup_has_no_metadata() {
        let response: LookupResponse = serde_json::from_str(r#"{"resultCount":0,"results":[]}"#).unwrap();
        assert!(response.into_metadata().is_none());
    }
}
