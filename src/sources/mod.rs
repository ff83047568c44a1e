//! # Sources
//!
//! Turns whatever the user typed into a playable [`Track`].
//!
//! [`detect`] classifies the input without touching the network, then the
//! [`ResolutionRouter`] hands it to the matching [`Resolver`]. Bridge
//! services (Spotify, Apple Music, Deezer, Tidal) only provide metadata, so
//! their resolvers finish by searching YouTube for a playable locator
//! (see [`bridge`]).

pub mod apple_music;
pub mod bridge;
pub mod deezer;
pub mod detect;
pub mod direct_url;
pub mod extractor;
pub mod spotify;
pub mod tidal;
pub mod youtube;

use async_trait::async_trait;
use std::{fmt, sync::Arc, time::Duration};
use tracing::{info, warn};

use crate::{config::Config, error::ResolutionError};

pub use apple_music::AppleMusicResolver;
pub use deezer::DeezerResolver;
pub use detect::detect;
pub use direct_url::DirectUrlResolver;
pub use extractor::ExtractorResolver;
pub use spotify::{SpotifyResolver, SpotifyTokenManager};
pub use tidal::TidalResolver;
pub use youtube::{YouTubeResolver, YtDlp};

/// Tipos de fuentes de música
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    YouTube,
    SpotifyBridge,
    AppleMusicBridge,
    DeezerBridge,
    TidalBridge,
    SoundCloud,
    Bandcamp,
    DirectHttp,
    Radio,
    Unknown,
}

impl SourceKind {
    /// Metadata-only services that always resolve to a YouTube locator.
    pub fn is_bridge(self) -> bool {
        matches!(
            self,
            Self::SpotifyBridge | Self::AppleMusicBridge | Self::DeezerBridge | Self::TidalBridge
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::YouTube => "youtube",
            Self::SpotifyBridge => "spotify",
            Self::AppleMusicBridge => "apple_music",
            Self::DeezerBridge => "deezer",
            Self::TidalBridge => "tidal",
            Self::SoundCloud => "soundcloud",
            Self::Bandcamp => "bandcamp",
            Self::DirectHttp => "direct",
            Self::Radio => "radio",
            Self::Unknown => "unknown",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::YouTube => "YouTube",
            Self::SpotifyBridge => "Spotify",
            Self::AppleMusicBridge => "Apple Music",
            Self::DeezerBridge => "Deezer",
            Self::TidalBridge => "Tidal",
            Self::SoundCloud => "SoundCloud",
            Self::Bandcamp => "Bandcamp",
            Self::DirectHttp => "URL directa",
            Self::Radio => "Radio",
            Self::Unknown => "Desconocida",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Representa un track de música ya resuelto
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    title: String,
    artist: String,
    duration_secs: u64,
    thumbnail_url: Option<String>,
    playable_locator: String,
    source_kind: SourceKind,
    origin_url: Option<String>,
    is_live: bool,
}

impl Track {
    pub fn new(
        title: impl Into<String>,
        artist: impl Into<String>,
        playable_locator: impl Into<String>,
        source_kind: SourceKind,
    ) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            duration_secs: 0,
            thumbnail_url: None,
            playable_locator: playable_locator.into(),
            source_kind,
            origin_url: None,
            is_live: false,
        }
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn artist(&self) -> &str {
        &self.artist
    }
    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }
    pub fn thumbnail_url(&self) -> Option<&str> {
        self.thumbnail_url.as_deref()
    }
    pub fn playable_locator(&self) -> &str {
        &self.playable_locator
    }
    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }
    pub fn origin_url(&self) -> Option<&str> {
        self.origin_url.as_deref()
    }
    pub fn is_live(&self) -> bool {
        self.is_live
    }

    /// `None` for live streams and unknown lengths.
    pub fn duration(&self) -> Option<Duration> {
        (self.duration_secs > 0).then(|| Duration::from_secs(self.duration_secs))
    }

    // Setters
    pub fn with_duration_secs(mut self, secs: u64) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn with_thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(url.into());
        self
    }

    pub fn with_origin_url(mut self, url: impl Into<String>) -> Self {
        self.origin_url = Some(url.into());
        self
    }

    pub fn with_source_kind(mut self, source_kind: SourceKind) -> Self {
        self.source_kind = source_kind;
        self
    }

    /// Marca el track como transmisión en vivo (sin duración)
    pub fn live(mut self) -> Self {
        self.is_live = true;
        self.duration_secs = 0;
        self
    }
}

/// Capacidad común de todos los resolvers de fuentes
#[async_trait]
pub trait Resolver: Send + Sync {
    /// True for collection links (playlists, albums, artist pages).
    fn is_non_playable(&self, url: &str) -> bool;

    /// Resuelve la entrada a un track normalizado
    async fn resolve(&self, input: &str) -> Result<Track, ResolutionError>;
}

/// One resolver per [`SourceKind`], looked up with an exhaustive match.
#[derive(Clone)]
pub struct ResolverTable {
    pub youtube: Arc<dyn Resolver>,
    pub spotify: Arc<dyn Resolver>,
    pub apple_music: Arc<dyn Resolver>,
    pub deezer: Arc<dyn Resolver>,
    pub tidal: Arc<dyn Resolver>,
    pub soundcloud: Arc<dyn Resolver>,
    pub bandcamp: Arc<dyn Resolver>,
    pub direct_http: Arc<dyn Resolver>,
    pub radio: Arc<dyn Resolver>,
    pub unknown: Arc<dyn Resolver>,
}

impl ResolverTable {
    pub fn get(&self, kind: SourceKind) -> &dyn Resolver {
        let resolver = match kind {
            SourceKind::YouTube => &self.youtube,
            SourceKind::SpotifyBridge => &self.spotify,
            SourceKind::AppleMusicBridge => &self.apple_music,
            SourceKind::DeezerBridge => &self.deezer,
            SourceKind::TidalBridge => &self.tidal,
            SourceKind::SoundCloud => &self.soundcloud,
            SourceKind::Bandcamp => &self.bandcamp,
            SourceKind::DirectHttp => &self.direct_http,
            SourceKind::Radio => &self.radio,
            SourceKind::Unknown => &self.unknown,
        };
        resolver.as_ref()
    }
}

/// Punto de entrada único para resolver consultas
pub struct ResolutionRouter {
    resolvers: ResolverTable,
    spotify_tokens: Option<Arc<SpotifyTokenManager>>,
    timeout: Duration,
}

impl ResolutionRouter {
    /// Builds every production resolver from the configuration.
    pub fn new(config: &Config) -> Result<Self, ResolutionError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent("Mozilla/5.0 (compatible; OpenJukebox/1.0)")
            .build()?;

        let ytdlp = YtDlp::new(config.ytdlp_path.clone(), config.cookies_file());
        let youtube = Arc::new(YouTubeResolver::new(ytdlp.clone()));

        let spotify_tokens = config
            .spotify_credentials()
            .map(|(id, secret)| Arc::new(SpotifyTokenManager::new(http.clone(), id, secret)));

        let resolvers = ResolverTable {
            youtube: youtube.clone(),
            spotify: Arc::new(SpotifyResolver::new(
                http.clone(),
                spotify_tokens.clone(),
                youtube.clone(),
            )),
            apple_music: Arc::new(AppleMusicResolver::new(http.clone(), youtube.clone())),
            deezer: Arc::new(DeezerResolver::new(http.clone(), youtube.clone())),
            tidal: Arc::new(TidalResolver::new(http, youtube)),
            soundcloud: Arc::new(ExtractorResolver::new(ytdlp.clone(), SourceKind::SoundCloud)),
            bandcamp: Arc::new(ExtractorResolver::new(ytdlp.clone(), SourceKind::Bandcamp)),
            direct_http: Arc::new(DirectUrlResolver::new(SourceKind::DirectHttp)),
            radio: Arc::new(DirectUrlResolver::new(SourceKind::Radio)),
            unknown: Arc::new(ExtractorResolver::new(ytdlp, SourceKind::Unknown)),
        };

        Ok(Self {
            resolvers,
            spotify_tokens,
            timeout: config.resolve_timeout(),
        })
    }

    pub fn from_table(resolvers: ResolverTable, timeout: Duration) -> Self {
        Self {
            resolvers,
            spotify_tokens: None,
            timeout,
        }
    }

    /// Token manager to drive the periodic refresh task, when Spotify is configured.
    pub fn spotify_tokens(&self) -> Option<Arc<SpotifyTokenManager>> {
        self.spotify_tokens.clone()
    }

    /// Resuelve cualquier consulta (URL o texto libre) a un track reproducible
    pub async fn resolve_query(&self, input: &str) -> Result<Track, ResolutionError> {
        let input = input.trim();
        let kind = detect(input);
        let resolver = self.resolvers.get(kind);

        if kind.is_bridge() && resolver.is_non_playable(input) {
            warn!("🚫 Colección de {} rechazada: {}", kind, input);
            return Err(ResolutionError::UnsupportedCollection { kind });
        }

        info!("🔍 Resolviendo '{}' vía {}", input, kind);

        let track = tokio::time::timeout(self.timeout, resolver.resolve(input))
            .await
            .map_err(|_| ResolutionError::Timeout(self.timeout))??;

        // Nunca se muestra "Desconocida": lo que yt-dlp resolvió se etiqueta como YouTube
        let track = if kind == SourceKind::Unknown && track.source_kind() == SourceKind::Unknown {
            track.with_source_kind(SourceKind::YouTube)
        } else {
            track
        };

        info!("✅ Resuelto: {} - {} [{}]", track.artist(), track.title(), track.source_kind());
        Ok(track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingResolver {
        kind: SourceKind,
        calls: AtomicUsize,
        collection_marker: &'static str,
    }

    impl CountingResolver {
        fn new(kind: SourceKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                calls: AtomicUsize::new(0),
                collection_marker: "/playlist/",
            })
        }
    }

    #[async_trait]
    impl Resolver for CountingResolver {
        fn is_non_playable(&self, url: &str) -> bool {
            url.contains(self.collection_marker)
        }

        async fn resolve(&self, input: &str) -> Result<Track, ResolutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Track::new("title", "artist", input, self.kind))
        }
    }

    struct Fixture {
        spotify: Arc<CountingResolver>,
        unknown: Arc<CountingResolver>,
        soundcloud: Arc<CountingResolver>,
        router: ResolutionRouter,
    }

    fn fixture() -> Fixture {
        let spotify = CountingResolver::new(SourceKind::SpotifyBridge);
        let unknown = CountingResolver::new(SourceKind::Unknown);
        let soundcloud = CountingResolver::new(SourceKind::SoundCloud);
        let table = ResolverTable {
            youtube: CountingResolver::new(SourceKind::YouTube),
            spotify: spotify.clone(),
            apple_music: CountingResolver::new(SourceKind::AppleMusicBridge),
            deezer: CountingResolver::new(SourceKind::DeezerBridge),
            tidal: CountingResolver::new(SourceKind::TidalBridge),
            soundcloud: soundcloud.clone(),
            bandcamp: CountingResolver::new(SourceKind::Bandcamp),
            direct_http: CountingResolver::new(SourceKind::DirectHttp),
            radio: CountingResolver::new(SourceKind::Radio),
            unknown: unknown.clone(),
        };

        Fixture {
            spotify,
            unknown,
            soundcloud,
            router: ResolutionRouter::from_table(table, Duration::from_secs(5)),
        }
    }

    #[tokio::test]
    async fn test_bridge_collection_is_rejected_without_resolving() {
        let f = fixture();

        let err = f
            .router
            .resolve_query("https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ResolutionError::UnsupportedCollection {
                kind: SourceKind::SpotifyBridge
            }
        ));
        assert_eq!(f.spotify.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bridge_track_is_dispatched() {
        let f = fixture();

        let track = f
            .router
            .resolve_query("https://open.spotify.com/track/abc123")
            .await
            .unwrap();

        assert_eq!(track.source_kind(), SourceKind::SpotifyBridge);
        assert_eq!(f.spotify.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_result_is_relabelled_as_youtube() {
        let f = fixture();

        let track = f
            .router
            .resolve_query("https://vimeo.com/123456")
            .await
            .unwrap();

        assert_eq!(f.unknown.calls.load(Ordering::SeqCst), 1);
        assert_eq!(track.source_kind(), SourceKind::YouTube);
    }

    #[tokio::test]
    async fn test_known_extractor_kinds_keep_their_label() {
        let f = fixture();

        let track = f
            .router
            .resolve_query("https://soundcloud.com/artist/song")
            .await
            .unwrap();

        assert_eq!(f.soundcloud.calls.load(Ordering::SeqCst), 1);
        assert_eq!(track.source_kind(), SourceKind::SoundCloud);
    }

    #[tokio::test]
    async fn test_non_bridge_collection_check_is_skipped() {
        let f = fixture();

        // SoundCloud no es bridge: la comprobación de colecciones no aplica
        let result = f
            .router
            .resolve_query("https://soundcloud.com/someone/playlist/x")
            .await;

        assert!(result.is_ok());
    }

    #[test]
    fn test_live_tracks_have_no_duration() {
        let track = Track::new("Radio", "host", "http://radio", SourceKind::Radio)
            .with_duration_secs(100)
            .live();

        assert!(track.is_live());
        assert_eq!(track.duration_secs(), 0);
        assert_eq!(track.duration(), None);
    }
}
