use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::{path::PathBuf, sync::LazyLock};
use tracing::{debug, info, warn};

use super::{bridge::TrackSearch, Resolver, SourceKind, Track};
use crate::error::ResolutionError;

static YOUTUBE_PLAYLIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[?&]list=|/playlist\?|/channel/|/@").expect("youtube playlist regex")
});

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
pub(crate) struct YtDlpInfo {
    pub id: Option<String>,
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    pub artist: Option<String>,
    pub channel: Option<String>,
    pub thumbnail: Option<String>,
    pub webpage_url: Option<String>,
    pub original_url: Option<String>,
    pub is_live: Option<bool>,
}

impl YtDlpInfo {
    /// Convierte la información de yt-dlp en un track
    pub fn into_track(self, kind: SourceKind, fallback_locator: &str) -> Result<Track, ResolutionError> {
        let title = self
            .title
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ResolutionError::MissingMetadata {
                kind,
                reason: "yt-dlp no devolvió título".to_string(),
            })?;

        let artist = self
            .artist
            .or(self.uploader)
            .or(self.channel)
            .unwrap_or_else(|| "Unknown".to_string());

        let locator = self
            .webpage_url
            .or(self.original_url)
            .or_else(|| {
                self.id
                    .as_ref()
                    .filter(|_| kind == SourceKind::YouTube)
                    .map(|id| format!("https://www.youtube.com/watch?v={}", id))
            })
            .unwrap_or_else(|| fallback_locator.to_string());

        let mut track = Track::new(title, artist, locator, kind)
            .with_duration_secs(self.duration.map(|d| d.max(0.0) as u64).unwrap_or(0));

        if let Some(thumbnail) = self.thumbnail {
            track = track.with_thumbnail(thumbnail);
        }

        if self.is_live.unwrap_or(false) {
            track = track.live();
        }

        Ok(track)
    }
}

/// Invocaciones de metadata a yt-dlp
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: PathBuf,
    cookies: Option<PathBuf>,
}

impl YtDlp {
    pub fn new(binary: PathBuf, cookies: Option<PathBuf>) -> Self {
        if let Some(cookies) = &cookies {
            info!("🍪 Usando cookies de yt-dlp: {}", cookies.display());
        }
        Self { binary, cookies }
    }

    /// Ejecuta `yt-dlp --dump-json` sobre el objetivo y parsea la primera línea
    pub(crate) async fn dump_json(&self, target: &str) -> Result<Option<YtDlpInfo>, ResolutionError> {
        debug!("📊 Obteniendo info de: {}", target);

        let mut command = Command::new(&self.binary);
        command.args(["--no-playlist", "--dump-json", "--no-warnings", "--skip-download"]);
        if let Some(cookies) = &self.cookies {
            command.arg("--cookies").arg(cookies);
        }
        command.arg(target);
        // Si el router abandona la consulta por timeout, el proceso muere con ella
        command.kill_on_drop(true);

        let output = command.output().await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("⚠️ yt-dlp falló para {}: {}", target, error);
            return Err(ResolutionError::Extractor { diagnostics: error });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_first_info(&stdout)
    }
}

/// Primera entrada JSON de la salida de yt-dlp; `None` si no hay ninguna
pub(crate) fn parse_first_info(stdout: &str) -> Result<Option<YtDlpInfo>, ResolutionError> {
    match stdout.lines().map(str::trim).find(|line| !line.is_empty()) {
        Some(line) => Ok(Some(serde_json::from_str(line)?)),
        None => Ok(None),
    }
}

/// Resolver de YouTube: URLs directas o búsqueda por texto
pub struct YouTubeResolver {
    ytdlp: YtDlp,
}

impl YouTubeResolver {
    pub fn new(ytdlp: YtDlp) -> Self {
        Self { ytdlp }
    }

    /// Verifica si una URL es válida para YouTube
    pub fn is_youtube_url(url: &str) -> bool {
        super::detect(url) == SourceKind::YouTube && url.starts_with("http")
    }
}

#[async_trait]
impl Resolver for YouTubeResolver {
    fn is_non_playable(&self, url: &str) -> bool {
        Self::is_youtube_url(url) && YOUTUBE_PLAYLIST.is_match(url) && !url.contains("watch?v=")
    }

    async fn resolve(&self, input: &str) -> Result<Track, ResolutionError> {
        if self.is_non_playable(input) {
            return Err(ResolutionError::UnsupportedCollection {
                kind: SourceKind::YouTube,
            });
        }

        if Self::is_youtube_url(input) {
            let info = self
                .ytdlp
                .dump_json(input)
                .await?
                .ok_or_else(|| ResolutionError::NoResults {
                    query: input.to_string(),
                })?;
            info.into_track(SourceKind::YouTube, input)
        } else {
            self.search_best(input).await
        }
    }
}

#[async_trait]
impl TrackSearch for YouTubeResolver {
    async fn search_best(&self, query: &str) -> Result<Track, ResolutionError> {
        info!("🔍 Buscando en YouTube: {}", query);

        let search_query = format!("ytsearch1:{}", query);
        let info = self
            .ytdlp
            .dump_json(&search_query)
            .await?
            .ok_or_else(|| ResolutionError::NoResults {
                query: query.to_string(),
            })?;

        info.into_track(SourceKind::YouTube, &search_query)
    }
}
