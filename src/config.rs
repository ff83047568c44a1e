use anyhow::Result;
use ::config::{builder::DefaultState, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use tracing::{debug, info};

/// Nombre base del archivo de configuración opcional (`open-jukebox.toml`)
const CONFIG_FILE: &str = "open-jukebox";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Reproducción (valores por defecto; cada guild puede sobreescribirlos)
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub idle_timeout_secs: u64,
    pub vote_skip_threshold: f32,

    // Tiempos límite
    pub stream_startup_timeout_secs: u64,
    pub resolve_timeout_secs: u64,

    // Spotify (client credentials)
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,

    // Backends externos
    pub ytdlp_path: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub cookies_path: Option<PathBuf>,

    // Paths
    pub data_dir: PathBuf,
}

impl Config {
    /// Loads configuration from `.env`, an optional `open-jukebox.toml` and
    /// the process environment, in increasing order of precedence.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let builder = Self::builder_with_defaults()?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::default().try_parsing(true));

        let config = Self::from_builder(builder)?;

        std::fs::create_dir_all(&config.data_dir)?;
        info!("⚙️ Configuración cargada");
        debug!("{}", config.summary());

        Ok(config)
    }

    /// Builder seeded with every default value; only `discord_token` and
    /// `application_id` have none.
    pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>> {
        let defaults = Self::default();

        let builder = ::config::Config::builder()
            .set_default("default_volume", defaults.default_volume as f64)?
            .set_default("max_queue_size", defaults.max_queue_size as i64)?
            .set_default("idle_timeout_secs", defaults.idle_timeout_secs as i64)?
            .set_default("vote_skip_threshold", defaults.vote_skip_threshold as f64)?
            .set_default(
                "stream_startup_timeout_secs",
                defaults.stream_startup_timeout_secs as i64,
            )?
            .set_default("resolve_timeout_secs", defaults.resolve_timeout_secs as i64)?
            .set_default("ytdlp_path", defaults.ytdlp_path.to_string_lossy().to_string())?
            .set_default("ffmpeg_path", defaults.ffmpeg_path.to_string_lossy().to_string())?
            .set_default("data_dir", defaults.data_dir.to_string_lossy().to_string())?;

        Ok(builder)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 1.0
    /// - Vote threshold must be in (0.0, 1.0]
    /// - Queue size and every timeout must be greater than 0
    /// - Spotify credentials come in pairs
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.0 and 1.0, got: {}",
                self.default_volume
            );
        }

        if self.vote_skip_threshold <= 0.0 || self.vote_skip_threshold > 1.0 {
            anyhow::bail!(
                "Vote skip threshold must be in (0.0, 1.0], got: {}",
                self.vote_skip_threshold
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.idle_timeout_secs == 0
            || self.stream_startup_timeout_secs == 0
            || self.resolve_timeout_secs == 0
        {
            anyhow::bail!("Timeouts must be greater than 0");
        }

        if self.spotify_client_id.is_some() != self.spotify_client_secret.is_some() {
            anyhow::bail!("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set together");
        }

        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn stream_startup_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_startup_timeout_secs)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    /// Credenciales de Spotify si ambas están presentes
    pub fn spotify_credentials(&self) -> Option<(String, String)> {
        match (&self.spotify_client_id, &self.spotify_client_secret) {
            (Some(id), Some(secret)) => Some((id.clone(), secret.clone())),
            _ => None,
        }
    }

    /// Archivo de cookies para yt-dlp: el configurado o el primero que exista
    /// en las rutas habituales.
    pub fn cookies_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cookies_path {
            return Some(path.clone());
        }

        let candidates = [
            format!(
                "{}/.config/yt-dlp/cookies.txt",
                std::env::var("HOME").unwrap_or_default()
            ),
            "/app/.config/yt-dlp/cookies.txt".to_string(),
            "./cookies.txt".to_string(),
        ];

        candidates
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Tokens and secrets are never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Playback: {}% vol, {} queue, {} idle, {}% vote threshold\n  \
            Timeouts: {} stream startup, {} resolution\n  \
            Backends: yt-dlp={}, ffmpeg={}, cookies={}\n  \
            Spotify: {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            humantime::format_duration(self.idle_timeout()),
            (self.vote_skip_threshold * 100.0) as u32,
            humantime::format_duration(self.stream_startup_timeout()),
            humantime::format_duration(self.resolve_timeout()),
            self.ytdlp_path.display(),
            self.ffmpeg_path.display(),
            self.cookies_path.is_some(),
            if self.spotify_credentials().is_some() { "enabled" } else { "disabled" },
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when neither the config file nor the environment
/// provides a value.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (sin valores por defecto)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            default_volume: 0.5,
            max_queue_size: 100,
            idle_timeout_secs: 300, // 5 minutos
            vote_skip_threshold: 0.5,

            stream_startup_timeout_secs: 15,
            resolve_timeout_secs: 30,

            spotify_client_id: None,
            spotify_client_secret: None,

            ytdlp_path: "yt-dlp".into(),
            ffmpeg_path: "ffmpeg".into(),
            cookies_path: None,

            data_dir: "./data".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn base() -> ConfigBuilder<DefaultState> {
        Config::builder_with_defaults()
            .unwrap()
            .set_override("discord_token", "token")
            .unwrap()
            .set_override("application_id", 42_i64)
            .unwrap()
    }

    #[test]
    fn test_defaults_fill_missing_values() {
        let config = Config::from_builder(base()).unwrap();

        assert_eq!(config.application_id, 42);
        assert_eq!(config.max_queue_size, 100);
        assert_eq!(config.idle_timeout(), Duration::from_secs(300));
        assert_eq!(config.stream_startup_timeout(), Duration::from_secs(15));
        assert_eq!(config.ytdlp_path, PathBuf::from("yt-dlp"));
        assert!(config.spotify_credentials().is_none());
    }

    #[test]
    fn test_missing_token_is_rejected() {
        let builder = Config::builder_with_defaults()
            .unwrap()
            .set_override("application_id", 1_i64)
            .unwrap();

        assert!(Config::from_builder(builder).is_err());
    }

    #[test]
    fn test_volume_out_of_range_is_rejected() {
        let builder = base().set_override("default_volume", 1.5).unwrap();
        assert!(Config::from_builder(builder).is_err());
    }

    #[test]
    fn test_spotify_credentials_must_come_in_pairs() {
        let builder = base().set_override("spotify_client_id", "abc").unwrap();
        assert!(Config::from_builder(builder).is_err());

        let builder = base()
            .set_override("spotify_client_id", "abc")
            .unwrap()
            .set_override("spotify_client_secret", "def")
            .unwrap();
        let config = Config::from_builder(builder).unwrap();
        assert_eq!(
            config.spotify_credentials(),
            Some(("abc".to_string(), "def".to_string()))
        );
    }

    #[test]
    fn test_summary_hides_secrets() {
        let mut config = Config::from_builder(base()).unwrap();
        config.spotify_client_secret = Some("super-secret".to_string());
        config.spotify_client_id = Some("id".to_string());

        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(!summary.contains("token"));
        assert!(summary.contains("Spotify: enabled"));
    }
}
