use async_trait::async_trait;
use tracing::info;

use super::{Resolver, SourceKind, Track, YtDlp};
use crate::error::ResolutionError;

/// Resolver genérico basado en yt-dlp (SoundCloud, Bandcamp y URLs desconocidas)
pub struct ExtractorResolver {
    ytdlp: YtDlp,
    kind: SourceKind,
}

impl ExtractorResolver {
    pub fn new(ytdlp: YtDlp, kind: SourceKind) -> Self {
        Self { ytdlp, kind }
    }
}

#[async_trait]
impl Resolver for ExtractorResolver {
    fn is_non_playable(&self, url: &str) -> bool {
        match self.kind {
            SourceKind::SoundCloud => url.contains("/sets/"),
            SourceKind::Bandcamp => url.contains("/album/"),
            _ => false,
        }
    }

    async fn resolve(&self, input: &str) -> Result<Track, ResolutionError> {
        if self.is_non_playable(input) {
            return Err(ResolutionError::UnsupportedCollection { kind: self.kind });
        }

        info!("🧩 Extrayendo {} con yt-dlp: {}", self.kind.as_str(), input);

        let info = self
            .ytdlp
            .dump_json(input)
            .await?
            .ok_or_else(|| ResolutionError::NoResults {
                query: input.to_string(),
            })?;

        info.into_track(self.kind, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(kind: SourceKind) -> ExtractorResolver {
        ExtractorResolver::new(YtDlp::new("yt-dlp".into(), None), kind)
    }

    #[test]
    fn test_sets_and_albums_are_collections() {
        assert!(resolver(SourceKind::SoundCloud).is_non_playable("https://soundcloud.com/artist/sets/summer"));
        assert!(!resolver(SourceKind::SoundCloud).is_non_playable("https://soundcloud.com/artist/song"));
        assert!(resolver(SourceKind::Bandcamp).is_non_playable("https://artist.bandcamp.com/album/lp"));
        assert!(!resolver(SourceKind::Bandcamp).is_non_playable("https://artist.bandcamp.com/track/song"));
    }

    #[test]
    fn test_unknown_sites_are_always_attempted() {
        assert!(!resolver(SourceKind::Unknown).is_non_playable("https://vimeo.com/album/123"));
    }

    #[tokio::test]
    async fn test_collection_fails_without_spawning() {
        // El binario no existe: si se lanzara, el error sería de E/S
        let resolver = ExtractorResolver::new(
            YtDlp::new("/nonexistent/yt-dlp".into(), None),
            SourceKind::SoundCloud,
        );

        let err = resolver
            .resolve("https://soundcloud.com/artist/sets/summer")
            .await
            .unwrap_err();

        assert!(matches!(err, ResolutionError::UnsupportedCollection { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_io_error() {
        let resolver = ExtractorResolver::new(
            YtDlp::new("/nonexistent/yt-dlp".into(), None),
            SourceKind::Unknown,
        );

        let err = resolver.resolve("https://vimeo.com/1").await.unwrap_err();
        assert!(matches!(err, ResolutionError::Io(_)));
    }
}
