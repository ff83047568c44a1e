//! Boundary between the playback engine and the chat platform.
//!
//! The engine never talks to Discord directly: it plays streams through a
//! [`Transport`], controls the running sink through [`Playback`] and learns
//! about the end of a track through [`SinkEvents`].

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use super::{queue::QueueItem, session::SessionCommand, stream::PlayableStream};
use crate::error::TransportError;

/// Identificador del mensaje de control publicado por el transporte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlMessageId(pub u64);

/// Contenido del panel "reproduciendo ahora"
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub item: QueueItem,
    /// Token de los botones del panel; cambia con cada track nuevo
    pub generation: u64,
    pub volume: f32,
    pub looping: bool,
    pub paused: bool,
    pub queue_len: usize,
}

/// Control de la reproducción activa en el sink
pub trait Playback: Send + Sync {
    fn pause(&self) -> Result<(), TransportError>;
    fn resume(&self) -> Result<(), TransportError>;
    fn set_volume(&self, volume: f32) -> Result<(), TransportError>;
    fn stop(&self);
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Empieza a reproducir el stream y reporta su final por `events`
    async fn start_playback(
        &self,
        stream: PlayableStream,
        volume: f32,
        events: SinkEvents,
    ) -> Result<Box<dyn Playback>, TransportError>;

    async fn send_control_message(&self, now_playing: &NowPlaying) -> Result<ControlMessageId, TransportError>;

    async fn update_control_message(
        &self,
        id: ControlMessageId,
        now_playing: &NowPlaying,
    ) -> Result<(), TransportError>;

    async fn disconnect(&self);
}

/// Eventos del sink hacia la sesión, etiquetados con la reproducción que los originó
#[derive(Debug, Clone)]
pub struct SinkEvents {
    tx: UnboundedSender<SessionCommand>,
    play_id: u64,
}

impl SinkEvents {
    pub(crate) fn new(tx: UnboundedSender<SessionCommand>, play_id: u64) -> Self {
        Self { tx, play_id }
    }

    pub fn play_id(&self) -> u64 {
        self.play_id
    }

    /// El track terminó (naturalmente o por `stop`)
    pub fn ended(&self) {
        self.send(None);
    }

    /// El backend falló en mitad de la reproducción
    pub fn errored(&self, message: impl Into<String>) {
        self.send(Some(message.into()));
    }

    fn send(&self, error: Option<String>) {
        let command = SessionCommand::SinkEnded {
            play_id: self.play_id,
            error,
        };
        if self.tx.send(command).is_err() {
            debug!("Evento del sink descartado: la sesión ya no existe");
        }
    }
}
