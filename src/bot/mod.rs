//! # Bot Module
//!
//! Discord adapter for Open Jukebox.
//!
//! This module contains the serenity/songbird side of the bot:
//! - Slash command registration and handling
//! - Control panel button routing
//! - Voice connection management through [`voice::SongbirdTransport`]
//!
//! ## Architecture
//!
//! [`OpenJukebox`] implements Serenity's [`EventHandler`]. It owns no playback
//! state itself: every guild's queue and player live in a session of the
//! [`SessionRegistry`], and the bot only translates Discord events into
//! session commands.
//!
//! ## Example
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use open_jukebox::{audio::{SessionRegistry, SessionSettings}, audio::stream::SubprocessStreamFactory};
//! # use open_jukebox::{bot::OpenJukebox, config::Config, sources::ResolutionRouter, storage::JsonStorage};
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let storage = Arc::new(JsonStorage::new(config.data_dir.clone()).await?);
//! let router = Arc::new(ResolutionRouter::new(&config)?);
//! let registry = Arc::new(SessionRegistry::new(
//!     Arc::new(SubprocessStreamFactory::from_config(&config)),
//!     storage.clone(),
//!     SessionSettings::from_config(&config),
//! ));
//! let bot = OpenJukebox::new(config, storage, router, registry);
//! # Ok(())
//! # }
//! ```

use anyhow::{Context as _, Result};
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;
pub mod voice;

use crate::{
    audio::{SessionHandle, SessionRegistry},
    config::Config,
    error::{PlayerError, TransportError},
    sources::ResolutionRouter,
    storage::JsonStorage,
};
use voice::SongbirdTransport;

/// Main Discord event handler.
///
/// Cheap to share: every field is an [`Arc`] injected from `main`.
pub struct OpenJukebox {
    /// Bot configuration loaded from environment variables
    config: Arc<Config>,
    /// JSON-based persistent storage (guild settings, saved playlists)
    pub storage: Arc<JsonStorage>,
    /// Turns user queries into playable tracks
    pub router: Arc<ResolutionRouter>,
    /// Live playback sessions, one per guild
    pub registry: Arc<SessionRegistry>,
}

impl OpenJukebox {
    pub fn new(
        config: Config,
        storage: Arc<JsonStorage>,
        router: Arc<ResolutionRouter>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            storage,
            router,
            registry,
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Guild commands (when `guild_id` is configured) propagate in about a
    /// second; global commands can take up to an hour.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .context("No se pudieron registrar comandos de guild. Verifica el permiso 'applications.commands'.")?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx)
                    .await
                    .context("No se pudieron registrar comandos globales. Verifica el permiso 'applications.commands'.")?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Sesión viva de la guild o `NothingPlaying`
    pub fn session(&self, guild_id: GuildId) -> Result<SessionHandle, PlayerError> {
        self.registry.get(guild_id).ok_or(PlayerError::NothingPlaying)
    }

    /// Returns the guild's session, joining `voice_channel` and creating
    /// one if there is none.
    ///
    /// Panels of a new session are posted to `text_channel`.
    pub async fn ensure_session(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        voice_channel: ChannelId,
        text_channel: ChannelId,
    ) -> Result<SessionHandle> {
        if let Some(session) = self.registry.get(guild_id) {
            return Ok(session);
        }

        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        let call = manager.join(guild_id, voice_channel).await.map_err(|e| {
            error!("Error al conectar al canal de voz: {:?}", e);
            PlayerError::Transport(TransportError::Join(e.to_string()))
        })?;
        info!("🔊 Conectado al canal de voz {} en guild {}", voice_channel, guild_id);

        let transport = Arc::new(SongbirdTransport::new(
            manager,
            call,
            ctx.http.clone(),
            guild_id,
            text_channel,
        ));
        Ok(self.registry.get_or_create(guild_id, move || transport))
    }

    /// Sale del canal de voz cuando no hay sesión que destruir
    pub async fn leave_voice_channel(&self, ctx: &Context, guild_id: GuildId) -> Result<()> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        if manager.get(guild_id).is_none() {
            return Err(handlers::UserError("No estoy en un canal de voz".to_string()).into());
        }

        manager.remove(guild_id).await?;
        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        Ok(())
    }
}

#[async_trait]
impl EventHandler for OpenJukebox {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Detecta cuando el bot es desconectado del canal de voz
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || new.channel_id.is_some() || old.is_none() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            info!("🔌 Bot desconectado en guild {}", guild_id);
            self.registry.transport_lost(guild_id);
        }
    }
}
