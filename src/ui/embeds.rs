use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{
        playlist::BulkReport,
        queue::{self, QueueItem},
        transport::NowPlaying,
        SessionSettings, SessionSnapshot,
    },
    sources::Track,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Open Jukebox";

const QUEUE_PAGE_SIZE: usize = 10;

fn duration_field(track: &Track) -> String {
    match track.duration() {
        Some(duration) => format_duration(duration),
        None => "🔴 En vivo".to_string(),
    }
}

fn track_link(track: &Track) -> String {
    let url = track.origin_url().unwrap_or_else(|| track.playable_locator());
    if url.starts_with("http") {
        format!("[{}]({})", track.title(), url)
    } else {
        track.title().to_string()
    }
}

/// Panel "reproduciendo ahora" con el estado de la sesión
pub fn now_playing_embed(now_playing: &NowPlaying) -> CreateEmbed {
    let track = &now_playing.item.track;
    let (title, color) = if now_playing.paused {
        ("⏸️ En Pausa", colors::WARNING_ORANGE)
    } else {
        ("🎵 Reproduciendo Ahora", colors::SUCCESS_GREEN)
    };

    let mut embed = CreateEmbed::default()
        .title(title)
        .description(format!("**{}**", track_link(track)))
        .color(color)
        .field("🎤 Artista", track.artist(), true)
        .field("⏱️ Duración", duration_field(track), true)
        .field("👤 Solicitado por", format!("<@{}>", now_playing.item.requested_by), true)
        .field("🔗 Fuente", track.source_kind().display_name(), true)
        .field("🔊 Volumen", format!("{}%", volume_percent(now_playing.volume)), true)
        .field(
            "🔂 Repetir",
            if now_playing.looping { "Activado" } else { "Desactivado" },
            true,
        );

    if let Some(thumbnail) = track.thumbnail_url() {
        embed = embed.thumbnail(thumbnail);
    }

    let footer = match now_playing.queue_len {
        0 => "📭 No hay más canciones en cola".to_string(),
        1 => "📋 1 canción en cola".to_string(),
        n => format!("📋 {} canciones en cola", n),
    };

    embed
        .footer(CreateEmbedFooter::new(footer))
        .timestamp(Timestamp::now())
}

/// Crea un embed para mostrar que se agregó una canción
pub fn track_added_embed(item: &QueueItem, position: usize) -> CreateEmbed {
    let track = &item.track;
    let mut embed = CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!("**{}** se ha agregado a la cola", track_link(track)))
        .color(colors::SUCCESS_GREEN)
        .field("🎤 Artista", track.artist(), true)
        .field("⏱️ Duración", duration_field(track), true)
        .field("📍 Posición", format!("#{}", position), true)
        .field("🔗 Fuente", track.source_kind().display_name(), true);

    if let Some(thumbnail) = track.thumbnail_url() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente cuando le toque",
        ))
        .timestamp(Timestamp::now())
}

/// Crea un embed para la canción que acaba de empezar por /play
pub fn track_started_embed(track: &Track) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("▶️ Reproduciendo")
        .description(format!("**{}**", track_link(track)))
        .color(colors::MUSIC_PURPLE)
        .field("🎤 Artista", track.artist(), true)
        .field("⏱️ Duración", duration_field(track), true);

    if let Some(thumbnail) = track.thumbnail_url() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Crea un embed para mostrar la cola de reproducción (página base 1)
pub fn queue_embed(snapshot: &SessionSnapshot, page: usize) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if snapshot.current.is_none() && snapshot.upcoming.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    let mut embed = embed;
    if let Some(current) = &snapshot.current {
        let status = if snapshot.looping { "🔂" } else { "▶️" };
        embed = embed.field(
            format!("{} Reproduciendo", status),
            format!(
                "**{}** - {} ({})",
                track_link(&current.track),
                current.track.artist(),
                duration_field(&current.track)
            ),
            false,
        );
    }

    let queue_page = queue::page(&snapshot.upcoming, page, QUEUE_PAGE_SIZE);
    if !queue_page.items.is_empty() {
        let lines: Vec<String> = queue_page
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                format!(
                    "`{}.` {} - {} ({})",
                    queue_page.offset + i + 1,
                    item.track.title(),
                    item.track.artist(),
                    duration_field(&item.track)
                )
            })
            .collect();
        embed = embed.field("⏭️ Siguientes", lines.join("\n"), false);
    }

    let total: Duration = snapshot
        .upcoming
        .iter()
        .filter_map(|item| item.track.duration())
        .sum();

    embed
        .field(
            "📊 En cola",
            format!("{}/{}", snapshot.upcoming.len(), snapshot.max_queue_size),
            true,
        )
        .field("⏱️ Duración total", format_duration(total), true)
        .footer(CreateEmbedFooter::new(format!(
            "Página {}/{} • {}",
            queue_page.current_page, queue_page.total_pages, STANDARD_FOOTER
        )))
        .timestamp(Timestamp::now())
}

/// Crea un embed con el resultado de una carga masiva
pub fn bulk_report_embed(playlist_name: &str, report: &BulkReport) -> CreateEmbed {
    let color = if report.succeeded == report.total {
        colors::SUCCESS_GREEN
    } else if report.succeeded == 0 {
        colors::ERROR_RED
    } else {
        colors::WARNING_ORANGE
    };

    let mut embed = CreateEmbed::default()
        .title(format!("📋 Playlist '{}'", playlist_name))
        .description(format!(
            "Se agregaron **{}/{}** canciones a la cola",
            report.succeeded, report.total
        ))
        .color(color);

    if !report.failures.is_empty() {
        let lines: Vec<String> = report
            .failures
            .iter()
            .take(10)
            .map(|(query, reason)| format!("• `{}`: {}", query, reason))
            .collect();
        let mut value = lines.join("\n");
        if report.failures.len() > 10 {
            value.push_str(&format!("\n… y {} más", report.failures.len() - 10));
        }
        embed = embed.field("⚠️ Omitidas", value, false);
    }

    embed
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Crea un embed con las playlists guardadas de la guild
pub fn playlist_list_embed(playlists: &[(String, usize)]) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("💾 Playlists Guardadas")
        .color(colors::MUSIC_PURPLE);

    if playlists.is_empty() {
        return embed
            .description("No hay playlists guardadas.\n\n💡 Usa `/playlist_add` para crear una")
            .color(colors::NEUTRAL_GRAY);
    }

    let lines: Vec<String> = playlists
        .iter()
        .map(|(name, count)| format!("• **{}** ({} canciones)", name, count))
        .collect();

    embed
        .description(lines.join("\n"))
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Crea un embed de volumen con indicador visual
pub fn volume_embed(volume: f32) -> CreateEmbed {
    let percent = volume_percent(volume);
    let emoji = match percent {
        0 => "🔈",
        1..=50 => "🔉",
        _ => "🔊",
    };

    CreateEmbed::default()
        .title(format!("{} Volumen", emoji))
        .description(format!("**Volumen actual: {}%**", percent))
        .field("📊 Nivel", volume_bar(volume), false)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
}

/// Ajustes efectivos del servidor
pub fn settings_embed(settings: &SessionSettings, updated: bool) -> CreateEmbed {
    let description = if updated {
        "Ajustes guardados. Se aplican a la próxima sesión de reproducción."
    } else {
        "Usa las opciones de `/settings` para cambiarlos."
    };

    CreateEmbed::default()
        .title("⚙️ Ajustes del Servidor")
        .description(description)
        .field("🔊 Volumen inicial", format!("{}%", volume_percent(settings.default_volume)), true)
        .field("📜 Cola máxima", settings.max_queue_size.to_string(), true)
        .field("⏲️ Inactividad", format_duration(settings.idle_timeout), true)
        .field(
            "🗳️ Votación",
            format!("{}% de los oyentes", (settings.vote_threshold * 100.0).round() as u32),
            true,
        )
        .color(if updated { colors::SUCCESS_GREEN } else { colors::INFO_BLUE })
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Guía de comandos
pub fn help_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Open Jukebox - Guía")
        .color(colors::INFO_BLUE)
        .description("Un reproductor por servidor, con cola y panel de controles")
        .field(
            "🎵 Reproducción",
            "• `/play <canción>` - Reproduce o agrega a la cola\n\
            • `/pause` / `/resume` - Pausa o reanuda\n\
            • `/skip` - Salta la canción actual\n\
            • `/voteskip` - Vota para saltar\n\
            • `/stop` - Detiene y limpia la cola",
            false,
        )
        .field(
            "📜 Cola",
            "• `/queue [página]` - Muestra la cola\n\
            • `/nowplaying` - Canción actual con controles\n\
            • `/loop [enabled]` - Repite la canción actual\n\
            • `/volume [nivel]` - Volumen de 0 a 100",
            false,
        )
        .field(
            "📝 Playlists",
            "• `/playlist_add <nombre> <canción>` - Guarda una canción\n\
            • `/playlist_play <nombre>` - Carga una playlist\n\
            • `/playlist_list` - Lista las playlists",
            false,
        )
        .field(
            "🔊 Conexión",
            "• `/join` - Conecta al canal de voz\n\
            • `/leave` - Desconecta del canal\n\
            • `/settings` - Ajustes del servidor (administradores)",
            false,
        )
        .field(
            "🎵 Fuentes Soportadas",
            "YouTube, Spotify, Apple Music, Deezer, Tidal, SoundCloud, Bandcamp, radios y URLs directas de audio",
            false,
        )
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

pub fn error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
}

pub fn success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
}

pub fn info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
}

fn volume_percent(volume: f32) -> u32 {
    (volume.clamp(0.0, 1.0) * 100.0).round() as u32
}

/// Crea una barra visual de volumen
fn volume_bar(volume: f32) -> String {
    let segments = 20;
    let filled = (volume.clamp(0.0, 1.0) * segments as f32).round() as usize;
    format!("`[{}{}]`", "█".repeat(filled), "▒".repeat(segments - filled))
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
