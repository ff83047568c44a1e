use anyhow::Result;
use serenity::{
    builder::{CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        playlist::enqueue_all, queue::QueueItem, transport::NowPlaying, AddOutcome,
        ControlOutcome, DestroyReason, SessionSettings, SessionState, VoteOutcome,
    },
    bot::OpenJukebox,
    error::{PlayerError, ResolutionError},
    storage::ServerConfig,
    ui::{buttons, embeds},
};

/// Error con un mensaje apto para el usuario
#[derive(Debug, Error)]
#[error("{0}")]
pub struct UserError(pub String);

fn user_error(message: impl Into<String>) -> anyhow::Error {
    UserError(message.into()).into()
}

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &OpenJukebox) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    // Defer la respuesta ya que la resolución puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let result = match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await,
        "pause" => handle_pause(bot, guild_id).await,
        "resume" => handle_resume(bot, guild_id).await,
        "skip" => handle_skip(bot, guild_id).await,
        "voteskip" => handle_voteskip(ctx, &command, bot, guild_id).await,
        "stop" => handle_stop(bot, guild_id).await,
        "join" => handle_join(ctx, &command, bot, guild_id).await,
        "leave" => handle_leave(ctx, bot, guild_id).await,
        "volume" => handle_volume(&command, bot, guild_id).await,
        "loop" => handle_loop(&command, bot, guild_id).await,
        "queue" => handle_queue(&command, bot, guild_id).await,
        "nowplaying" => handle_nowplaying(bot, guild_id).await,
        "playlist_add" => handle_playlist_add(&command, bot, guild_id).await,
        "playlist_play" => handle_playlist_play(ctx, &command, bot, guild_id).await,
        "playlist_list" => handle_playlist_list(bot, guild_id).await,
        "settings" => handle_settings(&command, bot, guild_id).await,
        "help" => Ok(EditInteractionResponse::new().embed(embeds::help_embed())),
        _ => Err(user_error("Comando no reconocido")),
    };

    let response = result.unwrap_or_else(|e| EditInteractionResponse::new().embed(error_embed_for(&e)));
    command.edit_response(&ctx.http, response).await?;

    Ok(())
}

/// Maneja los botones del panel de control
pub async fn handle_component(ctx: &Context, component: ComponentInteraction, bot: &OpenJukebox) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    let Some((action, generation)) = buttons::parse_custom_id(&component.data.custom_id) else {
        debug!("Componente desconocido ignorado: {}", component.data.custom_id);
        component
            .create_response(&ctx.http, CreateInteractionResponse::Acknowledge)
            .await?;
        return Ok(());
    };

    info!(
        "🔘 Botón {:?} (gen {}) presionado por {} en guild {}",
        action, generation, component.user.name, guild_id
    );

    let content = match bot.registry.get(guild_id) {
        Some(session) => {
            let listeners = listener_count(ctx, guild_id);
            match session
                .control_pressed(action, generation, component.user.id, listeners)
                .await
            {
                Ok(outcome) => describe_control(&outcome),
                Err(e) => format!("❌ {}", e.user_message()),
            }
        }
        None => describe_control(&ControlOutcome::Stale),
    };

    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await?;

    Ok(())
}

fn describe_control(outcome: &ControlOutcome) -> String {
    match outcome {
        ControlOutcome::Stale => "⌛ Este panel ya no está activo".to_string(),
        ControlOutcome::Paused => "⏸️ Pausado".to_string(),
        ControlOutcome::Resumed => "▶️ Reanudado".to_string(),
        ControlOutcome::Skipped(track) => format!("⏭️ Saltada: {}", track.title()),
        ControlOutcome::Vote(vote) => describe_vote(vote),
        ControlOutcome::Looping(true) => "🔂 Repetir canción activado".to_string(),
        ControlOutcome::Looping(false) => "➡️ Repetición desactivada".to_string(),
        ControlOutcome::Stopped => "⏹️ Reproducción detenida y cola limpiada".to_string(),
    }
}

fn describe_vote(vote: &VoteOutcome) -> String {
    match vote {
        VoteOutcome::Registered { votes, required } => format!("🗳️ Voto registrado ({}/{})", votes, required),
        VoteOutcome::AlreadyVoted { votes, required } => format!("🗳️ Ya votaste ({}/{})", votes, required),
        VoteOutcome::Skipped(track) => format!("⏭️ Votación aprobada, saltada: {}", track.title()),
    }
}

/// Convierte un error de un comando en un embed sin detalles internos
fn error_embed_for(error: &anyhow::Error) -> CreateEmbed {
    if let Some(e) = error.downcast_ref::<PlayerError>() {
        warn!("⚠️ Comando rechazado: {}", e);
        return embeds::error_embed("No se pudo completar", &e.user_message());
    }
    if let Some(e) = error.downcast_ref::<ResolutionError>() {
        warn!("⚠️ Resolución fallida: {}", e);
        return embeds::error_embed("No se pudo agregar", &e.user_message());
    }
    if let Some(e) = error.downcast_ref::<UserError>() {
        return embeds::error_embed("Error", &e.0);
    }

    error!("❌ Error inesperado en comando: {:?}", error);
    embeds::error_embed("Error", "Ocurrió un error inesperado, inténtalo de nuevo.")
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenJukebox,
    guild_id: GuildId,
) -> Result<EditInteractionResponse> {
    let query = option_str(command, "query").ok_or_else(|| user_error("Query no proporcionado"))?;
    let voice_channel = get_user_voice_channel(ctx, guild_id, command.user.id)?;

    // Resolver antes de conectar: un fallo no toca la sesión
    let track = bot.router.resolve_query(query).await?;
    let session = bot
        .ensure_session(ctx, guild_id, voice_channel, command.channel_id)
        .await?;

    let embed = match session.add_track(track.clone(), command.user.id).await? {
        AddOutcome::Started(track) => embeds::track_started_embed(&track),
        AddOutcome::Queued { position } => {
            embeds::track_added_embed(&QueueItem::new(track, command.user.id), position)
        }
        AddOutcome::Cancelled => {
            embeds::info_embed("Cancelada", "La canción se canceló antes de empezar.")
        }
    };

    Ok(EditInteractionResponse::new().embed(embed))
}

async fn handle_pause(bot: &OpenJukebox, guild_id: GuildId) -> Result<EditInteractionResponse> {
    bot.session(guild_id)?.pause().await?;
    Ok(EditInteractionResponse::new().embed(embeds::success_embed("Pausado", "⏸️ Reproducción pausada")))
}

async fn handle_resume(bot: &OpenJukebox, guild_id: GuildId) -> Result<EditInteractionResponse> {
    bot.session(guild_id)?.resume().await?;
    Ok(EditInteractionResponse::new().embed(embeds::success_embed("Reanudado", "▶️ Reproducción reanudada")))
}

async fn handle_skip(bot: &OpenJukebox, guild_id: GuildId) -> Result<EditInteractionResponse> {
    let skipped = bot.session(guild_id)?.skip().await?;
    Ok(EditInteractionResponse::new().embed(embeds::success_embed(
        "Saltada",
        &format!("⏭️ **{}**", skipped.title()),
    )))
}

async fn handle_voteskip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenJukebox,
    guild_id: GuildId,
) -> Result<EditInteractionResponse> {
    let session = bot.session(guild_id)?;
    let listeners = listener_count(ctx, guild_id);
    let outcome = session.vote_skip(command.user.id, listeners).await?;

    let embed = match &outcome {
        VoteOutcome::Skipped(_) => embeds::success_embed("Votación", &describe_vote(&outcome)),
        _ => embeds::info_embed("Votación", &describe_vote(&outcome)),
    };
    Ok(EditInteractionResponse::new().embed(embed))
}

async fn handle_stop(bot: &OpenJukebox, guild_id: GuildId) -> Result<EditInteractionResponse> {
    bot.session(guild_id)?.stop().await?;
    Ok(EditInteractionResponse::new().embed(embeds::success_embed(
        "Detenido",
        "⏹️ Reproducción detenida y cola limpiada",
    )))
}

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenJukebox,
    guild_id: GuildId,
) -> Result<EditInteractionResponse> {
    let voice_channel = get_user_voice_channel(ctx, guild_id, command.user.id)?;
    bot.ensure_session(ctx, guild_id, voice_channel, command.channel_id)
        .await?;

    Ok(EditInteractionResponse::new().embed(embeds::success_embed(
        "Conectado",
        &format!("🔊 Conectado a <#{}>", voice_channel),
    )))
}

async fn handle_leave(ctx: &Context, bot: &OpenJukebox, guild_id: GuildId) -> Result<EditInteractionResponse> {
    match bot.registry.get(guild_id) {
        Some(session) => session.destroy(DestroyReason::Leave).await?,
        None => bot.leave_voice_channel(ctx, guild_id).await?,
    }

    Ok(EditInteractionResponse::new().embed(embeds::success_embed(
        "Desconectado",
        "👋 Desconectado del canal de voz",
    )))
}

async fn handle_volume(
    command: &CommandInteraction,
    bot: &OpenJukebox,
    guild_id: GuildId,
) -> Result<EditInteractionResponse> {
    let session = bot.session(guild_id)?;

    let volume = match option_i64(command, "level") {
        Some(level) => session.set_volume(level as f32 / 100.0).await?,
        None => session.snapshot().await?.volume,
    };

    Ok(EditInteractionResponse::new().embed(embeds::volume_embed(volume)))
}

async fn handle_loop(
    command: &CommandInteraction,
    bot: &OpenJukebox,
    guild_id: GuildId,
) -> Result<EditInteractionResponse> {
    let session = bot.session(guild_id)?;

    let looping = match option_bool(command, "enabled") {
        Some(enabled) => session.set_looping(enabled).await?,
        None => session.toggle_loop().await?,
    };

    Ok(EditInteractionResponse::new().embed(embeds::success_embed(
        "Repetición",
        &describe_control(&ControlOutcome::Looping(looping)),
    )))
}

async fn handle_queue(
    command: &CommandInteraction,
    bot: &OpenJukebox,
    guild_id: GuildId,
) -> Result<EditInteractionResponse> {
    let page = option_i64(command, "page").unwrap_or(1).max(1) as usize;
    let snapshot = bot.session(guild_id)?.snapshot().await?;

    Ok(EditInteractionResponse::new().embed(embeds::queue_embed(&snapshot, page)))
}

async fn handle_nowplaying(bot: &OpenJukebox, guild_id: GuildId) -> Result<EditInteractionResponse> {
    let snapshot = bot.session(guild_id)?.snapshot().await?;
    let item = snapshot.current.ok_or(PlayerError::NothingPlaying)?;

    let now_playing = NowPlaying {
        item,
        generation: snapshot.generation,
        volume: snapshot.volume,
        looping: snapshot.looping,
        paused: snapshot.state == SessionState::Paused,
        queue_len: snapshot.upcoming.len(),
    };

    Ok(EditInteractionResponse::new()
        .embed(embeds::now_playing_embed(&now_playing))
        .components(buttons::player_controls(&now_playing)))
}

async fn handle_playlist_add(
    command: &CommandInteraction,
    bot: &OpenJukebox,
    guild_id: GuildId,
) -> Result<EditInteractionResponse> {
    let name = option_str(command, "name").ok_or_else(|| user_error("Falta el nombre de la playlist"))?;
    let query = option_str(command, "query").ok_or_else(|| user_error("Falta la canción"))?;

    let count = bot
        .storage
        .playlist_add(guild_id, name, query)
        .await
        .map_err(|e| user_error(format!("No se pudo guardar: {}", e)))?;

    Ok(EditInteractionResponse::new().embed(embeds::success_embed(
        "Playlist actualizada",
        &format!("📝 **{}** ahora tiene {} canciones", name.trim(), count),
    )))
}

async fn handle_playlist_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenJukebox,
    guild_id: GuildId,
) -> Result<EditInteractionResponse> {
    let name = option_str(command, "name").ok_or_else(|| user_error("Falta el nombre de la playlist"))?;
    let entries = bot
        .storage
        .playlist(guild_id, name)
        .await
        .ok_or_else(|| user_error(format!("No existe la playlist '{}'", name.trim())))?;

    let voice_channel = get_user_voice_channel(ctx, guild_id, command.user.id)?;
    let session = bot
        .ensure_session(ctx, guild_id, voice_channel, command.channel_id)
        .await?;

    let report = enqueue_all(&session, &bot.router, &entries, command.user.id).await;
    Ok(EditInteractionResponse::new().embed(embeds::bulk_report_embed(name.trim(), &report)))
}

async fn handle_playlist_list(bot: &OpenJukebox, guild_id: GuildId) -> Result<EditInteractionResponse> {
    let playlists = bot.storage.playlists(guild_id).await;
    Ok(EditInteractionResponse::new().embed(embeds::playlist_list_embed(&playlists)))
}

async fn handle_settings(
    command: &CommandInteraction,
    bot: &OpenJukebox,
    guild_id: GuildId,
) -> Result<EditInteractionResponse> {
    let update = settings_update(
        guild_id,
        option_i64(command, "volume"),
        option_i64(command, "max_queue"),
        option_i64(command, "idle_timeout"),
        option_i64(command, "vote_threshold"),
    );

    let mut config = bot.storage.server_config(guild_id);
    let updated = config.merge(&update);
    if updated {
        bot.storage.update_server_config(config).await?;
        info!("⚙️ Ajustes de guild {} cambiados por {}", guild_id, command.user.name);
    }

    let effective = SessionSettings::from_config(&bot.config).for_guild(guild_id, &*bot.storage);
    Ok(EditInteractionResponse::new().embed(embeds::settings_embed(&effective, updated)))
}

/// Traduce las opciones de `/settings` (porcentajes y segundos) a una configuración parcial
fn settings_update(
    guild_id: GuildId,
    volume: Option<i64>,
    max_queue: Option<i64>,
    idle_timeout: Option<i64>,
    vote_threshold: Option<i64>,
) -> ServerConfig {
    let percent = |value: Option<i64>| value.map(|v| v.clamp(0, 100) as f32 / 100.0);

    ServerConfig {
        default_volume: percent(volume),
        max_queue_size: max_queue.and_then(|v| usize::try_from(v).ok()).filter(|v| *v > 0),
        idle_timeout_secs: idle_timeout.and_then(|v| u64::try_from(v).ok()).filter(|v| *v > 0),
        vote_skip_threshold: percent(vote_threshold).filter(|v| *v > 0.0),
        ..ServerConfig::new(guild_id.get())
    }
}

// Funciones auxiliares

fn option_str<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn option_i64(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

fn option_bool(command: &CommandInteraction, name: &str) -> Option<bool> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_bool())
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| user_error("Debes estar en un canal de voz"))
}

/// Oyentes humanos en el canal de voz del bot (mínimo 1)
fn listener_count(ctx: &Context, guild_id: GuildId) -> usize {
    let bot_id = ctx.cache.current_user().id;
    let Some(guild) = guild_id.to_guild_cached(&ctx.cache) else {
        return 1;
    };
    let Some(channel) = guild.voice_states.get(&bot_id).and_then(|vs| vs.channel_id) else {
        return 1;
    };

    let states = guild.voice_states.values().map(|vs| {
        let is_bot = vs.member.as_ref().is_some_and(|m| m.user.bot);
        (vs.user_id, vs.channel_id, is_bot)
    });
    count_listeners(states, channel, bot_id).max(1)
}

fn count_listeners(
    states: impl IntoIterator<Item = (UserId, Option<ChannelId>, bool)>,
    channel: ChannelId,
    bot_id: UserId,
) -> usize {
    states
        .into_iter()
        .filter(|(user, user_channel, is_bot)| *user_channel == Some(channel) && !is_bot && *user != bot_id)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::stream::Backend,
        error::StreamStartError,
        sources::{SourceKind, Track},
    };
    use pretty_assertions::assert_eq;

    fn rendered(embed: &CreateEmbed) -> String {
        serde_json::to_string(embed).unwrap()
    }

    #[test]
    fn test_count_listeners_ignores_bots_and_other_channels() {
        let channel = ChannelId::new(10);
        let bot_id = UserId::new(1);
        let states = vec![
            (bot_id, Some(channel), false),
            (UserId::new(2), Some(channel), false),
            (UserId::new(3), Some(channel), false),
            (UserId::new(4), Some(channel), true),
            (UserId::new(5), Some(ChannelId::new(11)), false),
            (UserId::new(6), None, false),
        ];

        assert_eq!(count_listeners(states, channel, bot_id), 2);
    }

    #[test]
    fn test_error_embed_hides_backend_diagnostics() {
        let error = anyhow::Error::from(PlayerError::StreamStart(StreamStartError::EarlyExit {
            backend: Backend::Extractor,
            status: "exit status: 1".to_string(),
            diagnostics: "ERROR: [youtube] secret cookie dump".to_string(),
        }));

        let text = rendered(&error_embed_for(&error));

        assert!(text.contains("No se pudo reproducir la canción."));
        assert!(!text.contains("cookie"));
    }

    #[test]
    fn test_error_embed_uses_resolution_message() {
        let error = anyhow::Error::from(ResolutionError::UnsupportedCollection {
            kind: SourceKind::SpotifyBridge,
        });

        assert!(rendered(&error_embed_for(&error)).contains("no están soportados"));
    }

    #[test]
    fn test_unexpected_errors_are_generic() {
        let text = rendered(&error_embed_for(&anyhow::anyhow!("socket closed at 10.0.0.1")));

        assert!(text.contains("error inesperado"));
        assert!(!text.contains("10.0.0.1"));
        assert!(rendered(&error_embed_for(&user_error("Debes estar en un canal de voz")))
            .contains("Debes estar en un canal de voz"));
    }

    #[test]
    fn test_settings_update_converts_units() {
        let guild_id = GuildId::new(7);

        let update = settings_update(guild_id, Some(40), None, Some(120), Some(60));

        assert_eq!(update.guild_id, 7);
        assert_eq!(update.default_volume, Some(0.4));
        assert_eq!(update.max_queue_size, None);
        assert_eq!(update.idle_timeout_secs, Some(120));
        assert_eq!(update.vote_skip_threshold, Some(0.6));
        assert_eq!(
            settings_update(guild_id, None, Some(-3), Some(0), Some(0)),
            ServerConfig::new(7)
        );
    }

    #[test]
    fn test_describe_control_outcomes() {
        let track = Track::new("song", "artist", "https://youtu.be/x", SourceKind::YouTube);

        assert_eq!(describe_control(&ControlOutcome::Skipped(track.clone())), "⏭️ Saltada: song");
        assert_eq!(
            describe_control(&ControlOutcome::Vote(VoteOutcome::Registered { votes: 1, required: 3 })),
            "🗳️ Voto registrado (1/3)"
        );
        assert_eq!(
            describe_vote(&VoteOutcome::Skipped(track)),
            "⏭️ Votación aprobada, saltada: song"
        );
    }
}
