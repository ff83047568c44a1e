//! Songbird-backed [`Transport`]: plays session streams in a voice call and
//! renders the control panel as a message in the text channel where
//! playback was requested.

use async_trait::async_trait;
use serenity::{
    builder::{CreateMessage, EditMessage},
    http::Http,
    model::id::{ChannelId, GuildId, MessageId},
};
use songbird::{
    input::{AudioStream, Input, LiveInput},
    tracks::{PlayMode, TrackHandle},
    Call, Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler, Songbird,
    TrackEvent,
};
use std::sync::Arc;
use symphonia::core::{
    io::{MediaSource, ReadOnlySource},
    probe::Hint,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        stream::PlayableStream,
        transport::{ControlMessageId, NowPlaying, Playback, SinkEvents, Transport},
    },
    error::TransportError,
    ui::{buttons, embeds},
};

/// Transporte de una guild sobre una llamada de songbird
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    call: Arc<Mutex<Call>>,
    http: Arc<Http>,
    guild_id: GuildId,
    text_channel: ChannelId,
}

impl SongbirdTransport {
    pub fn new(
        manager: Arc<Songbird>,
        call: Arc<Mutex<Call>>,
        http: Arc<Http>,
        guild_id: GuildId,
        text_channel: ChannelId,
    ) -> Self {
        Self {
            manager,
            call,
            http,
            guild_id,
            text_channel,
        }
    }
}

#[async_trait]
impl Transport for SongbirdTransport {
    async fn start_playback(
        &self,
        stream: PlayableStream,
        volume: f32,
        events: SinkEvents,
    ) -> Result<Box<dyn Playback>, TransportError> {
        let mut hint = Hint::new();
        hint.with_extension(stream.format_hint());

        // El proceso lo controla la sesión; aquí solo se consume el audio
        let source: Box<dyn MediaSource> = Box::new(ReadOnlySource::new(stream.reader));
        let input = Input::Live(
            LiveInput::Raw(AudioStream {
                input: source,
                hint: Some(hint),
            }),
            None,
        );

        let handle = {
            let mut call = self.call.lock().await;
            if call.current_channel().is_none() {
                return Err(TransportError::Join("la llamada no está conectada".to_string()));
            }
            call.play_only_input(input)
        };

        let playback = SongbirdPlayback { handle };
        let registered = playback
            .handle
            .add_event(VoiceEvent::Track(TrackEvent::End), TrackEndForwarder(events.clone()))
            .and_then(|_| {
                playback
                    .handle
                    .add_event(VoiceEvent::Track(TrackEvent::Error), TrackErrorForwarder(events))
            })
            .map_err(|e| TransportError::Playback(e.to_string()))
            .and_then(|_| playback.set_volume(volume));

        if let Err(e) = registered {
            playback.stop();
            return Err(e);
        }

        debug!("🎵 Track enviado a songbird en guild {}", self.guild_id);
        Ok(Box::new(playback))
    }

    async fn send_control_message(&self, now_playing: &NowPlaying) -> Result<ControlMessageId, TransportError> {
        let message = CreateMessage::new()
            .embed(embeds::now_playing_embed(now_playing))
            .components(buttons::player_controls(now_playing));

        let sent = self
            .text_channel
            .send_message(&self.http, message)
            .await
            .map_err(|e| TransportError::Message(e.to_string()))?;

        Ok(ControlMessageId(sent.id.get()))
    }

    async fn update_control_message(&self, id: ControlMessageId, now_playing: &NowPlaying) -> Result<(), TransportError> {
        let edit = EditMessage::new()
            .embed(embeds::now_playing_embed(now_playing))
            .components(buttons::player_controls(now_playing));

        self.text_channel
            .edit_message(&self.http, MessageId::new(id.0), edit)
            .await
            .map_err(|e| TransportError::Message(e.to_string()))?;
        Ok(())
    }

    async fn disconnect(&self) {
        match self.manager.remove(self.guild_id).await {
            Ok(()) => info!("👋 Desconectado del canal de voz en guild {}", self.guild_id),
            Err(e) => warn!("⚠️ Error al salir del canal de voz en guild {}: {:?}", self.guild_id, e),
        }
    }
}

/// Control de un track de songbird
struct SongbirdPlayback {
    handle: TrackHandle,
}

impl Playback for SongbirdPlayback {
    fn pause(&self) -> Result<(), TransportError> {
        self.handle
            .pause()
            .map_err(|e| TransportError::Playback(e.to_string()))
    }

    fn resume(&self) -> Result<(), TransportError> {
        self.handle
            .play()
            .map_err(|e| TransportError::Playback(e.to_string()))
    }

    fn set_volume(&self, volume: f32) -> Result<(), TransportError> {
        self.handle
            .set_volume(volume)
            .map_err(|e| TransportError::Playback(e.to_string()))
    }

    fn stop(&self) {
        // El track puede haber terminado ya
        let _ = self.handle.stop();
    }
}

/// Reenvía el fin del track a la sesión
struct TrackEndForwarder(SinkEvents);

#[async_trait]
impl VoiceEventHandler for TrackEndForwarder {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        self.0.ended();
        None
    }
}

/// Reenvía los errores de reproducción a la sesión
struct TrackErrorForwarder(SinkEvents);

#[async_trait]
impl VoiceEventHandler for TrackErrorForwarder {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        let mut message = String::from("error desconocido");
        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                if let PlayMode::Errored(e) = &state.playing {
                    message = format!("{:?}", e);
                }
            }
        }

        error!("❌ Error en track (play {}): {}", self.0.play_id(), message);
        self.0.errored(message);
        None
    }
}
