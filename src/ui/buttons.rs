use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

use crate::audio::{transport::NowPlaying, ControlAction};

/// Prefijo de los botones del panel de control
pub const PLAYER_PREFIX: &str = "player";

fn action_slug(action: ControlAction) -> &'static str {
    match action {
        ControlAction::PauseResume => "pause_resume",
        ControlAction::Skip => "skip",
        ControlAction::VoteSkip => "vote_skip",
        ControlAction::ToggleLoop => "loop",
        ControlAction::Stop => "stop",
    }
}

/// Id del botón: `player:{accion}:{generacion}`
pub fn custom_id(action: ControlAction, generation: u64) -> String {
    format!("{}:{}:{}", PLAYER_PREFIX, action_slug(action), generation)
}

/// Interpreta el id de un botón del panel; `None` si no es nuestro
pub fn parse_custom_id(id: &str) -> Option<(ControlAction, u64)> {
    let mut parts = id.split(':');
    if parts.next()? != PLAYER_PREFIX {
        return None;
    }

    let action = match parts.next()? {
        "pause_resume" => ControlAction::PauseResume,
        "skip" => ControlAction::Skip,
        "vote_skip" => ControlAction::VoteSkip,
        "loop" => ControlAction::ToggleLoop,
        "stop" => ControlAction::Stop,
        _ => return None,
    };
    let generation = parts.next()?.parse().ok()?;

    if parts.next().is_some() {
        return None;
    }
    Some((action, generation))
}

/// Crea los controles del panel "reproduciendo ahora"
pub fn player_controls(now_playing: &NowPlaying) -> Vec<CreateActionRow> {
    let generation = now_playing.generation;

    let (pause_emoji, pause_style) = if now_playing.paused {
        ('▶', ButtonStyle::Success)
    } else {
        ('⏸', ButtonStyle::Secondary)
    };
    let loop_style = if now_playing.looping {
        ButtonStyle::Success
    } else {
        ButtonStyle::Secondary
    };

    let pause_btn = CreateButton::new(custom_id(ControlAction::PauseResume, generation))
        .emoji(pause_emoji)
        .style(pause_style);

    let skip_btn = CreateButton::new(custom_id(ControlAction::Skip, generation))
        .emoji('⏭')
        .style(ButtonStyle::Primary);

    let vote_btn = CreateButton::new(custom_id(ControlAction::VoteSkip, generation))
        .label("Votar")
        .emoji('🗳')
        .style(ButtonStyle::Secondary);

    let loop_btn = CreateButton::new(custom_id(ControlAction::ToggleLoop, generation))
        .emoji('🔂')
        .style(loop_style);

    let stop_btn = CreateButton::new(custom_id(ControlAction::Stop, generation))
        .emoji('⏹')
        .style(ButtonStyle::Danger);

    vec![CreateActionRow::Buttons(vec![
        pause_btn, skip_btn, vote_btn, loop_btn, stop_btn,
    ])]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::queue::QueueItem,
        sources::{SourceKind, Track},
    };
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;

    #[test]
    fn test_custom_id_carries_generation() {
        assert_eq!(custom_id(ControlAction::Skip, 7), "player:skip:7");
        assert_eq!(parse_custom_id("player:skip:7"), Some((ControlAction::Skip, 7)));
        assert_eq!(
            parse_custom_id("player:loop:12"),
            Some((ControlAction::ToggleLoop, 12))
        );
    }

    #[test]
    fn test_foreign_or_malformed_ids_are_rejected() {
        assert_eq!(parse_custom_id("music_skip"), None);
        assert_eq!(parse_custom_id("player:skip"), None);
        assert_eq!(parse_custom_id("player:skip:abc"), None);
        assert_eq!(parse_custom_id("player:shuffle:1"), None);
        assert_eq!(parse_custom_id("player:skip:1:extra"), None);
        assert_eq!(parse_custom_id("queue:skip:1"), None);
    }

    #[test]
    fn test_player_controls_use_current_generation() {
        let now_playing = NowPlaying {
            item: QueueItem::new(
                Track::new("song", "artist", "https://youtu.be/x", SourceKind::YouTube),
                UserId::new(1),
            ),
            generation: 3,
            volume: 0.5,
            looping: false,
            paused: true,
            queue_len: 0,
        };

        let rows = serde_json::to_string(&player_controls(&now_playing)).unwrap();

        for action in ["pause_resume", "skip", "vote_skip", "loop", "stop"] {
            assert!(rows.contains(&format!("player:{}:3", action)), "falta {}", action);
        }
    }
}
