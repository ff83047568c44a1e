use anyhow::{bail, Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serenity::model::id::GuildId;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::{fs, sync::Mutex};
use tracing::{info, warn};

use crate::audio::{SettingKey, SettingsProvider};

/// Máximo de caracteres en el nombre de una playlist
const MAX_PLAYLIST_NAME: usize = 100;
/// Máximo de entradas por playlist guardada
const MAX_PLAYLIST_ENTRIES: usize = 500;

/// Configuración de servidor almacenada en JSON.
///
/// Campos en `None` usan el valor global de la configuración.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub guild_id: u64,
    #[serde(default)]
    pub default_volume: Option<f32>,
    #[serde(default)]
    pub max_queue_size: Option<usize>,
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
    #[serde(default)]
    pub vote_skip_threshold: Option<f32>,
}

impl ServerConfig {
    pub fn new(guild_id: u64) -> Self {
        Self {
            guild_id,
            ..Default::default()
        }
    }

    /// Copia los valores presentes en `update`; devuelve si algo cambió
    pub fn merge(&mut self, update: &ServerConfig) -> bool {
        let before = self.clone();

        if update.default_volume.is_some() {
            self.default_volume = update.default_volume;
        }
        if update.max_queue_size.is_some() {
            self.max_queue_size = update.max_queue_size;
        }
        if update.idle_timeout_secs.is_some() {
            self.idle_timeout_secs = update.idle_timeout_secs;
        }
        if update.vote_skip_threshold.is_some() {
            self.vote_skip_threshold = update.vote_skip_threshold;
        }

        *self != before
    }

    fn value(&self, key: SettingKey) -> Option<f64> {
        match key {
            SettingKey::MaxQueueSize => self.max_queue_size.map(|v| v as f64),
            SettingKey::DefaultVolume => self.default_volume.map(f64::from),
            SettingKey::IdleTimeoutSecs => self.idle_timeout_secs.map(|v| v as f64),
            SettingKey::VoteThreshold => self.vote_skip_threshold.map(f64::from),
        }
    }
}

/// guild -> nombre -> consultas
type Playlists = BTreeMap<u64, BTreeMap<String, Vec<String>>>;

/// Manager de almacenamiento basado en archivos JSON
pub struct JsonStorage {
    data_dir: PathBuf,
    servers_cache: RwLock<HashMap<u64, ServerConfig>>,
    playlists: Mutex<Playlists>,
}

impl JsonStorage {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        let servers_dir = data_dir.join("servers");
        fs::create_dir_all(&servers_dir)
            .await
            .with_context(|| format!("no se pudo crear {}", servers_dir.display()))?;

        info!("📁 Storage inicializado en: {}", data_dir.display());

        let servers = load_all_servers(&servers_dir).await?;
        let playlists = load_playlists(&data_dir.join("playlists.json")).await?;

        Ok(Self {
            data_dir,
            servers_cache: RwLock::new(servers),
            playlists: Mutex::new(playlists),
        })
    }

    /// Configuración de un servidor (por defecto si no existe)
    pub fn server_config(&self, guild_id: GuildId) -> ServerConfig {
        self.servers_cache
            .read()
            .get(&guild_id.get())
            .cloned()
            .unwrap_or_else(|| ServerConfig::new(guild_id.get()))
    }

    /// Actualiza la configuración de un servidor
    pub async fn update_server_config(&self, config: ServerConfig) -> Result<()> {
        let guild_id = config.guild_id;
        let content = serde_json::to_string_pretty(&config)?;
        fs::write(self.server_file_path(guild_id), content).await?;

        self.servers_cache.write().insert(guild_id, config);
        info!("💾 Configuración actualizada para guild {}", guild_id);
        Ok(())
    }

    /// Agrega una consulta a una playlist guardada; devuelve su nuevo tamaño
    pub async fn playlist_add(&self, guild_id: GuildId, name: &str, query: &str) -> Result<usize> {
        let name = name.trim();
        let query = query.trim();
        if name.is_empty() || name.chars().count() > MAX_PLAYLIST_NAME {
            bail!("nombre de playlist inválido");
        }
        if query.is_empty() {
            bail!("consulta vacía");
        }

        let mut playlists = self.playlists.lock().await;
        let entries = playlists
            .entry(guild_id.get())
            .or_default()
            .entry(name.to_string())
            .or_default();

        if entries.len() >= MAX_PLAYLIST_ENTRIES {
            bail!("la playlist '{}' está llena ({} canciones)", name, MAX_PLAYLIST_ENTRIES);
        }
        entries.push(query.to_string());
        let len = entries.len();

        let content = serde_json::to_string_pretty(&*playlists)?;
        fs::write(self.playlists_path(), content).await?;

        info!("📝 '{}' agregada a la playlist '{}' de guild {}", query, name, guild_id);
        Ok(len)
    }

    /// Entradas de una playlist guardada
    pub async fn playlist(&self, guild_id: GuildId, name: &str) -> Option<Vec<String>> {
        self.playlists
            .lock()
            .await
            .get(&guild_id.get())
            .and_then(|lists| lists.get(name.trim()))
            .cloned()
    }

    /// Nombre y tamaño de cada playlist de la guild
    pub async fn playlists(&self, guild_id: GuildId) -> Vec<(String, usize)> {
        self.playlists
            .lock()
            .await
            .get(&guild_id.get())
            .map(|lists| {
                lists
                    .iter()
                    .map(|(name, entries)| (name.clone(), entries.len()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn server_file_path(&self, guild_id: u64) -> PathBuf {
        self.data_dir.join("servers").join(format!("guild_{}.json", guild_id))
    }

    fn playlists_path(&self) -> PathBuf {
        self.data_dir.join("playlists.json")
    }
}

impl SettingsProvider for JsonStorage {
    fn get_setting(&self, guild_id: GuildId, key: SettingKey) -> Option<f64> {
        self.servers_cache.read().get(&guild_id.get())?.value(key)
    }
}

async fn load_all_servers(servers_dir: &Path) -> Result<HashMap<u64, ServerConfig>> {
    let mut servers = HashMap::new();
    let mut files = fs::read_dir(servers_dir).await?;

    while let Some(entry) = files.next_entry().await? {
        let path = entry.path();
        if path.extension().map_or(true, |ext| ext != "json") {
            continue;
        }

        let Some(guild_id) = path
            .file_stem()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix("guild_"))
            .and_then(|id| id.parse::<u64>().ok())
        else {
            continue;
        };

        let parsed = fs::read_to_string(&path)
            .await
            .map_err(anyhow::Error::from)
            .and_then(|content| Ok(serde_json::from_str::<ServerConfig>(&content)?));

        match parsed {
            Ok(config) => {
                servers.insert(guild_id, config);
            }
            Err(e) => warn!("Error cargando configuración para guild {}: {}", guild_id, e),
        }
    }

    if !servers.is_empty() {
        info!("📂 Cargadas {} configuraciones de servidor", servers.len());
    }
    Ok(servers)
}

async fn load_playlists(path: &Path) -> Result<Playlists> {
    if !fs::try_exists(path).await? {
        return Ok(Playlists::new());
    }

    let content = fs::read_to_string(path).await?;
    match serde_json::from_str(&content) {
        Ok(playlists) => Ok(playlists),
        Err(e) => {
            // No se descarta el archivo: se ignora hasta la próxima escritura
            warn!("⚠️ playlists.json corrupto, se empieza vacío: {}", e);
            Ok(Playlists::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const GUILD: GuildId = GuildId::new(99);

    #[tokio::test]
    async fn test_missing_config_yields_no_overrides() {
        let dir = TempDir::new().unwrap();
        let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();

        assert_eq!(storage.server_config(GUILD), ServerConfig::new(99));
        assert_eq!(storage.get_setting(GUILD, SettingKey::DefaultVolume), None);
    }

    #[tokio::test]
    async fn test_server_config_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();

        let config = ServerConfig {
            max_queue_size: Some(25),
            vote_skip_threshold: Some(0.75),
            ..ServerConfig::new(99)
        };
        storage.update_server_config(config.clone()).await.unwrap();
        assert!(dir.path().join("servers/guild_99.json").exists());

        let reloaded = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();
        assert_eq!(reloaded.server_config(GUILD), config);
        assert_eq!(reloaded.get_setting(GUILD, SettingKey::MaxQueueSize), Some(25.0));
        assert_eq!(reloaded.get_setting(GUILD, SettingKey::VoteThreshold), Some(0.75));
        assert_eq!(reloaded.get_setting(GUILD, SettingKey::IdleTimeoutSecs), None);
    }

    #[test]
    fn test_merge_keeps_unset_values() {
        let mut config = ServerConfig {
            default_volume: Some(0.3),
            max_queue_size: Some(10),
            ..ServerConfig::new(99)
        };

        let changed = config.merge(&ServerConfig {
            max_queue_size: Some(40),
            ..ServerConfig::new(99)
        });

        assert!(changed);
        assert_eq!(config.default_volume, Some(0.3));
        assert_eq!(config.max_queue_size, Some(40));
        assert!(!config.clone().merge(&ServerConfig::new(99)));
        assert!(!config.clone().merge(&config.clone()));
    }

    #[tokio::test]
    async fn test_corrupt_server_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("servers")).unwrap();
        std::fs::write(dir.path().join("servers/guild_5.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("servers/notes.txt"), "hola").unwrap();

        let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();

        assert_eq!(storage.get_setting(GuildId::new(5), SettingKey::MaxQueueSize), None);
    }

    #[tokio::test]
    async fn test_playlists_are_saved_per_guild() {
        let dir = TempDir::new().unwrap();
        let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();

        assert_eq!(storage.playlist_add(GUILD, "chill", "lofi beats").await.unwrap(), 1);
        assert_eq!(
            storage
                .playlist_add(GUILD, " chill ", "https://youtu.be/abc")
                .await
                .unwrap(),
            2
        );
        storage.playlist_add(GUILD, "rock", "queen").await.unwrap();
        storage.playlist_add(GuildId::new(1), "other", "x").await.unwrap();

        let reloaded = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();
        assert_eq!(
            reloaded.playlist(GUILD, "chill").await,
            Some(vec!["lofi beats".to_string(), "https://youtu.be/abc".to_string()])
        );
        assert_eq!(
            reloaded.playlists(GUILD).await,
            vec![("chill".to_string(), 2), ("rock".to_string(), 1)]
        );
        assert_eq!(reloaded.playlist(GUILD, "other").await, None);
    }

    #[tokio::test]
    async fn test_playlist_add_rejects_empty_input() {
        let dir = TempDir::new().unwrap();
        let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();

        assert!(storage.playlist_add(GUILD, "  ", "song").await.is_err());
        assert!(storage.playlist_add(GUILD, "mix", " ").await.is_err());
        assert!(storage.playlists(GUILD).await.is_empty());
    }
}
