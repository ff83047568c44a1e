use regex::Regex;
use std::sync::LazyLock;

use super::SourceKind;

static YOUTUBE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://((www|m|music)\.)?(youtube\.com|youtu\.be)/").expect("youtube regex")
});

static SPOTIFY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(open\.spotify\.com|play\.spotify\.com|spotify\.link)/").expect("spotify regex")
});

// Apple Music siempre lleva región: music.apple.com/us/album/...
static APPLE_MUSIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(geo\.)?music\.apple\.com/[a-z]{2}/").expect("apple music regex")
});

static DEEZER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://((www\.)?deezer\.com/|deezer\.page\.link/|link\.deezer\.com/)").expect("deezer regex")
});

static TIDAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://((www|listen)\.)?tidal\.com/").expect("tidal regex")
});

static SOUNDCLOUD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://((www|m)\.)?(soundcloud\.com|on\.soundcloud\.com)/").expect("soundcloud regex")
});

static BANDCAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://([a-z0-9-]+\.)?bandcamp\.com/").expect("bandcamp regex")
});

// Firmas de streams de radio; se comprueban antes que las extensiones de audio
static RADIO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\.(pls|m3u8?)(\?|$)|/(stream|listen)(/|\?|$)|icecast|shoutcast|:8000(/|$))")
        .expect("radio regex")
});

static AUDIO_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(mp3|ogg|opus|flac|wav|m4a|aac|webm)(\?|$)").expect("audio file regex")
});

/// Clasifica una entrada sin hacer I/O.
///
/// Text that is not a URL is a YouTube search; a URL no pattern recognises
/// is [`SourceKind::Unknown`] and still goes through the generic extractor.
pub fn detect(input: &str) -> SourceKind {
    let input = input.trim();

    if input.starts_with("spotify:") {
        return SourceKind::SpotifyBridge;
    }

    let lower = input.to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return SourceKind::YouTube;
    }

    // El orden importa: dominios específicos primero, firmas genéricas al final
    if YOUTUBE.is_match(&lower) {
        SourceKind::YouTube
    } else if SPOTIFY.is_match(&lower) {
        SourceKind::SpotifyBridge
    } else if APPLE_MUSIC.is_match(&lower) {
        SourceKind::AppleMusicBridge
    } else if DEEZER.is_match(&lower) {
        SourceKind::DeezerBridge
    } else if TIDAL.is_match(&lower) {
        SourceKind::TidalBridge
    } else if SOUNDCLOUD.is_match(&lower) {
        SourceKind::SoundCloud
    } else if BANDCAMP.is_match(&lower) {
        SourceKind::Bandcamp
    } else if RADIO.is_match(&lower) {
        SourceKind::Radio
    } else if AUDIO_FILE.is_match(&lower) {
        SourceKind::DirectHttp
    } else {
        SourceKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_free_text_is_a_youtube_search() {
        assert_eq!(detect("never gonna give you up"), SourceKind::YouTube);
        assert_eq!(detect("  daft punk - one more time "), SourceKind::YouTube);
        // Sin esquema no se trata como URL
        assert_eq!(detect("open.spotify.com/track/abc"), SourceKind::YouTube);
    }

    #[test]
    fn test_youtube_urls() {
        assert_eq!(detect("https://www.youtube.com/watch?v=dQw4w9WgXcQ"), SourceKind::YouTube);
        assert_eq!(detect("https://youtu.be/dQw4w9WgXcQ"), SourceKind::YouTube);
        assert_eq!(detect("https://music.youtube.com/watch?v=abc"), SourceKind::YouTube);
        assert_eq!(detect("https://youtube.com/shorts/abc"), SourceKind::YouTube);
    }

    #[test]
    fn test_spotify_track_and_uri() {
        assert_eq!(detect("https://open.spotify.com/track/abc123"), SourceKind::SpotifyBridge);
        assert_eq!(detect("spotify:track:abc123"), SourceKind::SpotifyBridge);
        assert_eq!(detect("https://spotify.link/xyz"), SourceKind::SpotifyBridge);
    }

    #[test]
    fn test_bridge_services() {
        assert_eq!(
            detect("https://music.apple.com/us/album/song/1440857781?i=1440857786"),
            SourceKind::AppleMusicBridge
        );
        assert_eq!(detect("https://www.deezer.com/en/track/3135556"), SourceKind::DeezerBridge);
        assert_eq!(detect("https://deezer.page.link/abc"), SourceKind::DeezerBridge);
        assert_eq!(detect("https://tidal.com/browse/track/77646168"), SourceKind::TidalBridge);
        assert_eq!(detect("https://listen.tidal.com/track/77646168"), SourceKind::TidalBridge);
    }

    #[test]
    fn test_apple_without_region_is_not_a_bridge() {
        assert_eq!(detect("https://music.apple.com/browse"), SourceKind::Unknown);
    }

    #[test]
    fn test_extractor_sites() {
        assert_eq!(detect("https://soundcloud.com/artist/track"), SourceKind::SoundCloud);
        assert_eq!(detect("https://artist.bandcamp.com/track/song"), SourceKind::Bandcamp);
    }

    #[test]
    fn test_radio_before_audio_extension() {
        assert_eq!(detect("http://radio.example.com:8000/live.mp3"), SourceKind::Radio);
        assert_eq!(detect("http://radio.example.com:8000/"), SourceKind::Radio);
        assert_eq!(detect("https://example.com/stream"), SourceKind::Radio);
        assert_eq!(detect("https://example.com/playlist.m3u8"), SourceKind::Radio);
        assert_eq!(detect("https://ice1.somafm.com/groovesalad-128-mp3"), SourceKind::Unknown);
        assert_eq!(detect("http://uk1.internet-radio.com/icecast/live"), SourceKind::Radio);
    }

    #[test]
    fn test_direct_audio_files() {
        assert_eq!(detect("https://cdn.example.com/music/song.mp3"), SourceKind::DirectHttp);
        assert_eq!(detect("https://cdn.example.com/a/b.FLAC?token=1"), SourceKind::DirectHttp);
    }

    #[test]
    fn test_unmatched_url_is_unknown() {
        assert_eq!(detect("https://vimeo.com/123456"), SourceKind::Unknown);
    }
}
