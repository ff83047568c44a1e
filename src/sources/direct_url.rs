use async_trait::async_trait;
use url::Url;

use super::{Resolver, SourceKind, Track};
use crate::error::ResolutionError;

/// Extensiones que se quitan del nombre del archivo al derivar el título
const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "ogg", "opus", "flac", "wav", "m4a", "aac", "webm", "pls", "m3u", "m3u8",
];

/// Resolver sintáctico para archivos de audio y radios por HTTP
pub struct DirectUrlResolver {
    kind: SourceKind,
}

impl DirectUrlResolver {
    pub fn new(kind: SourceKind) -> Self {
        Self { kind }
    }
}

/// Título derivado del último segmento de la ruta, o el host si no hay ninguno
pub fn title_from_url(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(|s| urlencoding::decode(s).map(|d| d.into_owned()).unwrap_or_else(|_| s.to_string()));

    let title = segment.map(|name| {
        let stem = match name.rsplit_once('.') {
            Some((stem, ext)) if AUDIO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) => {
                stem.to_string()
            }
            _ => name,
        };
        stem.replace(['_', '-', '+'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    });

    title
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| url.host_str().unwrap_or("Stream").to_string())
}

#[async_trait]
impl Resolver for DirectUrlResolver {
    fn is_non_playable(&self, _url: &str) -> bool {
        false
    }

    async fn resolve(&self, input: &str) -> Result<Track, ResolutionError> {
        let url = Url::parse(input).map_err(|_| ResolutionError::InvalidUrl {
            kind: self.kind,
            url: input.to_string(),
        })?;

        let artist = url.host_str().unwrap_or("Unknown").to_string();
        let track = Track::new(title_from_url(&url), artist, input, self.kind).with_origin_url(input);

        Ok(match self.kind {
            SourceKind::Radio => track.live(),
            _ => track,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn title(url: &str) -> String {
        title_from_url(&Url::parse(url).unwrap())
    }

    #[test]
    fn test_title_from_file_name() {
        assert_eq!(title("https://cdn.example.com/music/My_Great-Song.mp3"), "My Great Song");
        assert_eq!(title("https://cdn.example.com/a/Caf%C3%A9%20del%20Mar.flac?x=1"), "Café del Mar");
        assert_eq!(title("https://cdn.example.com/a/lo+fi+beats.OGG"), "lo fi beats");
    }

    #[test]
    fn test_title_falls_back_to_host() {
        assert_eq!(title("http://radio.example.com:8000/"), "radio.example.com");
    }

    #[test]
    fn test_unknown_extension_is_kept() {
        assert_eq!(title("https://example.com/stream.v2"), "stream.v2");
    }

    #[tokio::test]
    async fn test_radio_is_live_without_duration() {
        let track = DirectUrlResolver::new(SourceKind::Radio)
            .resolve("http://radio.example.com:8000/stream")
            .await
            .unwrap();

        assert!(track.is_live());
        assert_eq!(track.duration_secs(), 0);
        assert_eq!(track.artist(), "radio.example.com");
        assert_eq!(track.title(), "stream");
        assert_eq!(track.source_kind(), SourceKind::Radio);
        assert_eq!(track.playable_locator(), "http://radio.example.com:8000/stream");
    }

    #[tokio::test]
    async fn test_direct_file_is_not_live() {
        let track = DirectUrlResolver::new(SourceKind::DirectHttp)
            .resolve("https://cdn.example.com/song.mp3")
            .await
            .unwrap();

        assert!(!track.is_live());
        assert_eq!(track.title(), "song");
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let err = DirectUrlResolver::new(SourceKind::DirectHttp)
            .resolve("not a url")
            .await
            .unwrap_err();

        assert!(matches!(err, ResolutionError::InvalidUrl { .. }));
    }
}
