use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId, Permissions},
    prelude::Context,
};

/// Todos los comandos slash del bot
pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        voteskip_command(),
        stop_command(),
        join_command(),
        leave_command(),
        volume_command(),
        loop_command(),
        queue_command(),
        nowplaying_command(),
        playlist_add_command(),
        playlist_play_command(),
        playlist_list_command(),
        settings_command(),
        help_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }
    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción (URL o búsqueda)")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL de YouTube, Spotify, Apple Music, Deezer, Tidal, SoundCloud, Bandcamp, radio o búsqueda",
            )
            .required(true),
        )
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta la canción actual")
}

fn voteskip_command() -> CreateCommand {
    CreateCommand::new("voteskip").description("Vota para saltar la canción actual")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción y limpia la cola")
}

// Comandos de conexión

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Une el bot a tu canal de voz")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot del canal de voz")
}

// Comandos de ajuste

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Muestra o ajusta el volumen")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "level", "Volumen (0-100)")
                .min_int_value(0)
                .max_int_value(100),
        )
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Repite la canción actual")
        .add_option(CreateCommandOption::new(
            CommandOptionType::Boolean,
            "enabled",
            "Activar o desactivar (por defecto alterna)",
        ))
}

// Comandos de información

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra la cola de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Número de página")
                .min_int_value(1),
        )
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Muestra la canción actual con sus controles")
}

// Playlists guardadas

fn playlist_add_command() -> CreateCommand {
    CreateCommand::new("playlist_add")
        .description("Agrega una canción a una playlist guardada")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "name", "Nombre de la playlist")
                .required(true)
                .max_length(100),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "URL o búsqueda")
                .required(true),
        )
}

fn playlist_play_command() -> CreateCommand {
    CreateCommand::new("playlist_play")
        .description("Carga una playlist guardada en la cola")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "name", "Nombre de la playlist")
                .required(true),
        )
}

fn playlist_list_command() -> CreateCommand {
    CreateCommand::new("playlist_list").description("Lista las playlists guardadas")
}

// Administración y ayuda

fn settings_command() -> CreateCommand {
    CreateCommand::new("settings")
        .description("Muestra o cambia los ajustes del servidor")
        .default_member_permissions(Permissions::MANAGE_GUILD)
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "volume", "Volumen inicial (0-100)")
                .min_int_value(0)
                .max_int_value(100),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "max_queue", "Tamaño máximo de la cola")
                .min_int_value(1)
                .max_int_value(1000),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "idle_timeout",
                "Segundos sin música antes de desconectar",
            )
            .min_int_value(10)
            .max_int_value(3600),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "vote_threshold",
                "Porcentaje de oyentes para saltar por votación",
            )
            .min_int_value(1)
            .max_int_value(100),
        )
}

fn help_command() -> CreateCommand {
    CreateCommand::new("help").description("Muestra información de ayuda")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    fn names() -> Vec<String> {
        all_commands()
            .iter()
            .map(|command| {
                serde_json::to_value(command).unwrap()["name"]
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn test_every_command_is_registered_once() {
        let names = names();
        let unique: HashSet<_> = names.iter().collect();

        assert_eq!(names.len(), 17);
        assert_eq!(unique.len(), names.len());
        for expected in [
            "play",
            "voteskip",
            "nowplaying",
            "playlist_add",
            "playlist_play",
            "playlist_list",
            "settings",
            "help",
        ] {
            assert!(names.iter().any(|n| n == expected), "falta /{}", expected);
        }
    }

    #[test]
    fn test_volume_option_is_bounded() {
        let volume = serde_json::to_value(volume_command()).unwrap();
        let option = &volume["options"][0];

        assert_eq!(option["name"], "level");
        assert_eq!(option["min_value"], 0);
        assert_eq!(option["max_value"], 100);
    }

    #[test]
    fn test_settings_requires_manage_guild() {
        let settings = serde_json::to_value(settings_command()).unwrap();

        assert_eq!(
            settings["default_member_permissions"],
            Permissions::MANAGE_GUILD.bits().to_string()
        );
        assert_eq!(settings["options"].as_array().unwrap().len(), 4);
    }
}
