//! Common finishing step for metadata-only services.
//!
//! Spotify, Apple Music, Deezer and Tidal tell us *what* a song is but give
//! no audio we can stream. Their resolvers collect [`BridgeMetadata`] and
//! call [`finish`], which searches YouTube for the best match and merges the
//! origin's artwork and duration on top of it.

use async_trait::async_trait;
use tracing::debug;

use super::{SourceKind, Track};
use crate::error::ResolutionError;

/// Artista usado cuando el servicio no permite distinguirlo del título
pub const UNKNOWN_ARTIST: &str = "Unknown";

/// Búsqueda del mejor resultado en YouTube
#[async_trait]
pub trait TrackSearch: Send + Sync {
    async fn search_best(&self, query: &str) -> Result<Track, ResolutionError>;
}

/// Metadata extraída del servicio de origen
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BridgeMetadata {
    pub title: String,
    pub artist: String,
    pub duration_secs: Option<u64>,
    pub artwork_url: Option<String>,
}

impl BridgeMetadata {
    /// Parte una cadena "Título by Artista" o "Artista - Título".
    ///
    /// Without a separator the whole string is the title and the artist is
    /// [`UNKNOWN_ARTIST`].
    pub fn from_combined(text: &str) -> Self {
        let text = text.trim();

        if let Some((title, artist)) = text.rsplit_once(" by ") {
            if !title.trim().is_empty() && !artist.trim().is_empty() {
                return Self::new(title.trim(), artist.trim());
            }
        }

        if let Some((artist, title)) = text.split_once(" - ") {
            if !title.trim().is_empty() && !artist.trim().is_empty() {
                return Self::new(title.trim(), artist.trim());
            }
        }

        Self::new(text, UNKNOWN_ARTIST)
    }

    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            duration_secs: None,
            artwork_url: None,
        }
    }

    pub fn with_duration_secs(mut self, secs: u64) -> Self {
        self.duration_secs = (secs > 0).then_some(secs);
        self
    }

    pub fn with_artwork(mut self, url: Option<String>) -> Self {
        self.artwork_url = url.filter(|u| !u.is_empty());
        self
    }

    fn search_query(&self) -> String {
        if self.artist.is_empty() || self.artist == UNKNOWN_ARTIST {
            self.title.clone()
        } else {
            format!("{} {}", self.artist, self.title)
        }
    }
}

/// Busca la metadata en YouTube y construye el track final.
///
/// Fails with `MissingMetadata` before searching when the title is empty.
pub async fn finish(
    search: &dyn TrackSearch,
    kind: SourceKind,
    origin_url: &str,
    metadata: BridgeMetadata,
) -> Result<Track, ResolutionError> {
    if metadata.title.trim().is_empty() {
        return Err(ResolutionError::MissingMetadata {
            kind,
            reason: "título vacío".to_string(),
        });
    }

    let query = metadata.search_query();
    debug!("🌉 {} → búsqueda en YouTube: {}", kind, query);

    let found = search.search_best(&query).await?;

    let artist = if metadata.artist.is_empty() {
        UNKNOWN_ARTIST.to_string()
    } else {
        metadata.artist
    };

    let mut track = Track::new(metadata.title, artist, found.playable_locator(), kind)
        .with_origin_url(origin_url)
        .with_duration_secs(metadata.duration_secs.unwrap_or(found.duration_secs()));

    // La carátula del servicio de origen tiene prioridad
    if let Some(artwork) = metadata.artwork_url.or_else(|| found.thumbnail_url().map(String::from)) {
        track = track.with_thumbnail(artwork);
    }

    Ok(track)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    /// Búsqueda falsa que registra las consultas recibidas
    #[derive(Default)]
    pub(crate) struct FakeSearch {
        pub queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TrackSearch for FakeSearch {
        async fn search_best(&self, query: &str) -> Result<Track, ResolutionError> {
            self.queries.lock().push(query.to_string());
            Ok(Track::new("YT title", "YT channel", "https://youtube.com/watch?v=found", SourceKind::YouTube)
                .with_duration_secs(245)
                .with_thumbnail("https://i.ytimg.com/vi/found/hq.jpg"))
        }
    }

    #[tokio::test]
    async fn test_origin_metadata_wins_over_youtube() {
        let search = FakeSearch::default();
        let metadata = BridgeMetadata::new("Harder Better", "Daft Punk")
            .with_duration_secs(224)
            .with_artwork(Some("https://cdn.example/cover.jpg".to_string()));

        let track = finish(&search, SourceKind::DeezerBridge, "https://deezer.com/track/1", metadata)
            .await
            .unwrap();

        assert_eq!(*search.queries.lock(), vec!["Daft Punk Harder Better".to_string()]);
        assert_eq!(track.title(), "Harder Better");
        assert_eq!(track.artist(), "Daft Punk");
        assert_eq!(track.playable_locator(), "https://youtube.com/watch?v=found");
        assert_eq!(track.duration_secs(), 224);
        assert_eq!(track.thumbnail_url(), Some("https://cdn.example/cover.jpg"));
        assert_eq!(track.source_kind(), SourceKind::DeezerBridge);
        assert_eq!(track.origin_url(), Some("https://deezer.com/track/1"));
    }

    #[tokio::test]
    async fn test_youtube_fills_missing_origin_fields() {
        let search = FakeSearch::default();

        let track = finish(&search, SourceKind::TidalBridge, "https://tidal.com/browse/track/1", BridgeMetadata::new("Song", "Band"))
            .await
            .unwrap();

        assert_eq!(track.duration_secs(), 245);
        assert_eq!(track.thumbnail_url(), Some("https://i.ytimg.com/vi/found/hq.jpg"));
    }

    #[tokio::test]
    async fn test_empty_title_never_searches() {
        let search = FakeSearch::default();

        let err = finish(&search, SourceKind::TidalBridge, "https://tidal.com/browse/track/1", BridgeMetadata::new("  ", "Band"))
            .await
            .unwrap_err();

        assert!(matches!(err, ResolutionError::MissingMetadata { .. }));
        assert!(search.queries.lock().is_empty());
    }

    #[test]
    fn test_combined_text_splitting() {
        assert_eq!(
            BridgeMetadata::from_combined("Get Lucky by Daft Punk"),
            BridgeMetadata::new("Get Lucky", "Daft Punk")
        );
        assert_eq!(
            BridgeMetadata::from_combined("Daft Punk - Get Lucky"),
            BridgeMetadata::new("Get Lucky", "Daft Punk")
        );
        assert_eq!(
            BridgeMetadata::from_combined("Get Lucky"),
            BridgeMetadata::new("Get Lucky", UNKNOWN_ARTIST)
        );
    }

    #[tokio::test]
    async fn test_unknown_artist_searches_by_title_only() {
        let search = FakeSearch::default();

        finish(&search, SourceKind::TidalBridge, "u", BridgeMetadata::from_combined("Lonely Title"))
            .await
            .unwrap();

        assert_eq!(*search.queries.lock(), vec!["Lonely Title".to_string()]);
    }
}
