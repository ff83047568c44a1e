//! Per-guild playback engine.
//!
//! Each session is an actor: one task owns all of the session state and
//! consumes [`SessionCommand`]s from an unbounded channel. User commands,
//! finished stream loads, sink events, control buttons and the idle
//! watchdog all arrive through that channel, so no two of them ever touch
//! the state at the same time.
//!
//! Three counters keep late events from acting on the wrong track:
//!
//! - `load_id`: identifies the stream load in flight. Results of superseded
//!   loads are discarded and their process killed.
//! - `play_id`: identifies the sink playback. Only the end event of the
//!   current playback advances the queue.
//! - `generation`: identifies the "now playing" panel. It moves as soon as a
//!   different track starts loading, so presses from an older panel are
//!   ignored even before the new panel is posted.

use dashmap::DashMap;
use serenity::model::id::{GuildId, UserId};
use std::{collections::HashSet, ops::ControlFlow, sync::Arc, time::Duration};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::{
    queue::{MusicQueue, QueueItem},
    stream::{PlayableStream, ProcessHandle, StreamFactory},
    transport::{ControlMessageId, NowPlaying, Playback, SinkEvents, Transport},
    watchdog::IdleWatchdog,
};
use crate::{
    config::Config,
    error::{PlayerError, StreamStartError},
    sources::Track,
};

/// Ajustes que una guild puede sobreescribir
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    MaxQueueSize,
    DefaultVolume,
    IdleTimeoutSecs,
    VoteThreshold,
}

/// Fuente de configuración por guild (persistencia externa)
#[cfg_attr(test, mockall::automock)]
pub trait SettingsProvider: Send + Sync {
    fn get_setting(&self, guild_id: GuildId, key: SettingKey) -> Option<f64>;
}

/// Ajustes efectivos de una sesión
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub max_queue_size: usize,
    pub default_volume: f32,
    pub idle_timeout: Duration,
    pub vote_threshold: f32,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_queue_size: config.max_queue_size,
            default_volume: config.default_volume,
            idle_timeout: config.idle_timeout(),
            vote_threshold: config.vote_skip_threshold,
        }
    }

    /// Combina los valores de la guild con los globales; los inválidos se ignoran
    pub fn for_guild(&self, guild_id: GuildId, provider: &dyn SettingsProvider) -> Self {
        let get = |key| provider.get_setting(guild_id, key).filter(|v| v.is_finite());

        Self {
            max_queue_size: get(SettingKey::MaxQueueSize)
                .filter(|v| *v >= 1.0)
                .map_or(self.max_queue_size, |v| v as usize),
            default_volume: get(SettingKey::DefaultVolume)
                .filter(|v| (0.0..=1.0).contains(v))
                .map_or(self.default_volume, |v| v as f32),
            idle_timeout: get(SettingKey::IdleTimeoutSecs)
                .filter(|v| *v >= 1.0)
                .map_or(self.idle_timeout, |v| Duration::from_secs(v as u64)),
            vote_threshold: get(SettingKey::VoteThreshold)
                .filter(|v| *v > 0.0 && *v <= 1.0)
                .map_or(self.vote_threshold, |v| v as f32),
        }
    }
}

/// Votos necesarios para saltar: `max(1, ceil(miembros × umbral))`
///
/// El umbral se redondea a milésimas antes de multiplicar: un `0.6` en f32
/// vale 0.6000000238 y daría un voto de más.
pub fn required_votes(listeners: usize, threshold: f32) -> usize {
    let per_mille = (f64::from(threshold) * 1000.0).round().max(0.0) as usize;
    (listeners * per_mille).div_ceil(1000).max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Loading,
    Playing,
    Paused,
    Draining,
    Destroyed,
}

/// Resultado de `add_track`
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    /// El track empezó a sonar
    Started(Track),
    /// Quedó en cola en esta posición (base 1)
    Queued { position: usize },
    /// Se canceló mientras cargaba (stop o skip)
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VoteOutcome {
    Registered { votes: usize, required: usize },
    AlreadyVoted { votes: usize, required: usize },
    Skipped(Track),
}

/// Botones del panel de control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    PauseResume,
    Skip,
    VoteSkip,
    ToggleLoop,
    Stop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlOutcome {
    /// El botón pertenece a un panel anterior
    Stale,
    Paused,
    Resumed,
    Skipped(Track),
    Vote(VoteOutcome),
    Looping(bool),
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyReason {
    Leave,
    IdleTimeout,
    TransportLost,
    Shutdown,
}

/// Vista de solo lectura del estado de una sesión
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub current: Option<QueueItem>,
    pub upcoming: Vec<QueueItem>,
    pub volume: f32,
    pub looping: bool,
    pub skip_votes: usize,
    pub generation: u64,
    pub max_queue_size: usize,
}

type Reply<T> = oneshot::Sender<T>;

pub(crate) enum SessionCommand {
    AddTrack {
        item: QueueItem,
        reply: Reply<Result<AddOutcome, PlayerError>>,
    },
    Pause {
        reply: Reply<Result<(), PlayerError>>,
    },
    Resume {
        reply: Reply<Result<(), PlayerError>>,
    },
    Skip {
        reply: Reply<Result<Track, PlayerError>>,
    },
    VoteSkip {
        voter: UserId,
        required: usize,
        reply: Reply<Result<VoteOutcome, PlayerError>>,
    },
    Stop {
        reply: Reply<()>,
    },
    Destroy {
        reason: DestroyReason,
        reply: Option<Reply<()>>,
    },
    SetVolume {
        volume: f32,
        reply: Reply<f32>,
    },
    SetLooping {
        looping: Option<bool>,
        reply: Reply<bool>,
    },
    Snapshot {
        reply: Reply<SessionSnapshot>,
    },
    ControlPressed {
        action: ControlAction,
        generation: u64,
        required_votes: usize,
        reply: Reply<Result<ControlOutcome, PlayerError>>,
        user: UserId,
    },
    StreamReady {
        load_id: u64,
        result: Result<PlayableStream, StreamStartError>,
    },
    SinkEnded {
        play_id: u64,
        error: Option<String>,
    },
    IdleExpired {
        generation: u64,
    },
}

/// Handle clonable para enviar comandos a una sesión
#[derive(Clone)]
pub struct SessionHandle {
    guild_id: GuildId,
    instance_id: u64,
    settings: SessionSettings,
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("guild_id", &self.guild_id)
            .field("instance_id", &self.instance_id)
            .finish()
    }
}

impl SessionHandle {
    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub(crate) fn instance_id(&self) -> u64 {
        self.instance_id
    }

    /// True cuando el actor ya terminó
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> SessionCommand) -> Result<T, PlayerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| PlayerError::SessionClosed)?;
        rx.await.map_err(|_| PlayerError::SessionClosed)
    }

    /// Agrega un track; si no suena nada, espera a que arranque
    pub async fn add_track(&self, track: Track, requested_by: UserId) -> Result<AddOutcome, PlayerError> {
        let item = QueueItem::new(track, requested_by);
        self.request(|reply| SessionCommand::AddTrack { item, reply }).await?
    }

    pub async fn pause(&self) -> Result<(), PlayerError> {
        self.request(|reply| SessionCommand::Pause { reply }).await?
    }

    pub async fn resume(&self) -> Result<(), PlayerError> {
        self.request(|reply| SessionCommand::Resume { reply }).await?
    }

    /// Salta el track actual; devuelve el track saltado
    pub async fn skip(&self) -> Result<Track, PlayerError> {
        self.request(|reply| SessionCommand::Skip { reply }).await?
    }

    /// Registra el voto de `voter` con `listeners` oyentes en el canal
    pub async fn vote_skip(&self, voter: UserId, listeners: usize) -> Result<VoteOutcome, PlayerError> {
        let required = required_votes(listeners, self.settings.vote_threshold);
        self.request(|reply| SessionCommand::VoteSkip {
            voter,
            required,
            reply,
        })
        .await?
    }

    /// Vacía la cola y detiene la reproducción sin desconectar
    pub async fn stop(&self) -> Result<(), PlayerError> {
        self.request(|reply| SessionCommand::Stop { reply }).await
    }

    /// Destruye la sesión y espera a que termine
    pub async fn destroy(&self, reason: DestroyReason) -> Result<(), PlayerError> {
        self.request(|reply| SessionCommand::Destroy {
            reason,
            reply: Some(reply),
        })
        .await
    }

    /// Cambia el volumen (se limita a [0, 1]); devuelve el valor aplicado
    pub async fn set_volume(&self, volume: f32) -> Result<f32, PlayerError> {
        self.request(|reply| SessionCommand::SetVolume { volume, reply }).await
    }

    pub async fn set_looping(&self, looping: bool) -> Result<bool, PlayerError> {
        self.request(|reply| SessionCommand::SetLooping {
            looping: Some(looping),
            reply,
        })
        .await
    }

    pub async fn toggle_loop(&self) -> Result<bool, PlayerError> {
        self.request(|reply| SessionCommand::SetLooping { looping: None, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, PlayerError> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    /// Botón del panel; `generation` viene en el id del botón
    pub async fn control_pressed(
        &self,
        action: ControlAction,
        generation: u64,
        user: UserId,
        listeners: usize,
    ) -> Result<ControlOutcome, PlayerError> {
        let required_votes = required_votes(listeners, self.settings.vote_threshold);
        self.request(|reply| SessionCommand::ControlPressed {
            action,
            generation,
            required_votes,
            reply,
            user,
        })
        .await?
    }

    /// Destrucción sin esperar respuesta (pérdida del transporte)
    pub(crate) fn destroy_detached(&self, reason: DestroyReason) {
        let _ = self.tx.send(SessionCommand::Destroy { reason, reply: None });
    }
}

/// Lanza el actor de una sesión nueva
pub(crate) fn spawn_session(
    guild_id: GuildId,
    instance_id: u64,
    settings: SessionSettings,
    transport: Arc<dyn Transport>,
    factory: Arc<dyn StreamFactory>,
    sessions: Arc<DashMap<GuildId, SessionHandle>>,
) -> SessionHandle {
    let (tx, rx) = mpsc::unbounded_channel();

    let actor = SessionActor {
        guild_id,
        instance_id,
        settings,
        tx: tx.clone(),
        rx,
        transport,
        factory,
        sessions,
        queue: MusicQueue::new(settings.max_queue_size),
        current: None,
        state: SessionState::Idle,
        volume: settings.default_volume,
        looping: false,
        votes: HashSet::new(),
        playback: None,
        process: None,
        load_id: 0,
        play_id: 0,
        generation: 0,
        replaying: false,
        control_message: None,
        pending_add: None,
        watchdog: IdleWatchdog::new(tx.clone(), |generation| SessionCommand::IdleExpired { generation }),
    };

    info!("🎛️ Sesión creada para guild {}", guild_id);
    tokio::spawn(actor.run());

    SessionHandle {
        guild_id,
        instance_id,
        settings,
        tx,
    }
}

struct SessionActor {
    guild_id: GuildId,
    instance_id: u64,
    settings: SessionSettings,
    tx: mpsc::UnboundedSender<SessionCommand>,
    rx: mpsc::UnboundedReceiver<SessionCommand>,
    transport: Arc<dyn Transport>,
    factory: Arc<dyn StreamFactory>,
    sessions: Arc<DashMap<GuildId, SessionHandle>>,

    queue: MusicQueue,
    current: Option<QueueItem>,
    state: SessionState,
    volume: f32,
    looping: bool,
    votes: HashSet<UserId>,
    playback: Option<Box<dyn Playback>>,
    process: Option<ProcessHandle>,

    load_id: u64,
    play_id: u64,
    generation: u64,
    /// La carga en curso repite el track actual por el loop
    replaying: bool,
    control_message: Option<ControlMessageId>,
    pending_add: Option<Reply<Result<AddOutcome, PlayerError>>>,
    watchdog: IdleWatchdog<SessionCommand>,
}

impl SessionActor {
    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            if self.handle(command).await.is_break() {
                break;
            }
        }
        debug!("Actor de la guild {} terminado", self.guild_id);
    }

    async fn handle(&mut self, command: SessionCommand) -> ControlFlow<()> {
        match command {
            SessionCommand::AddTrack { item, reply } => self.add_track(item, reply),
            SessionCommand::Pause { reply } => {
                let _ = reply.send(self.pause().await);
            }
            SessionCommand::Resume { reply } => {
                let _ = reply.send(self.resume().await);
            }
            SessionCommand::Skip { reply } => {
                let _ = reply.send(self.skip().await);
            }
            SessionCommand::VoteSkip { voter, required, reply } => {
                let _ = reply.send(self.vote_skip(voter, required).await);
            }
            SessionCommand::Stop { reply } => {
                self.stop();
                let _ = reply.send(());
            }
            SessionCommand::Destroy { reason, reply } => {
                self.destroy(reason).await;
                if let Some(reply) = reply {
                    let _ = reply.send(());
                }
                return ControlFlow::Break(());
            }
            SessionCommand::SetVolume { volume, reply } => {
                let _ = reply.send(self.set_volume(volume).await);
            }
            SessionCommand::SetLooping { looping, reply } => {
                let looping = looping.unwrap_or(!self.looping);
                let _ = reply.send(self.set_looping(looping).await);
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            SessionCommand::ControlPressed {
                action,
                generation,
                required_votes,
                reply,
                user,
            } => {
                let outcome = self.control_pressed(action, generation, user, required_votes).await;
                let _ = reply.send(outcome);
            }
            SessionCommand::StreamReady { load_id, result } => self.stream_ready(load_id, result).await,
            SessionCommand::SinkEnded { play_id, error } => {
                if play_id != self.play_id || self.playback.is_none() {
                    debug!("Evento de fin obsoleto (play {} != {})", play_id, self.play_id);
                    return ControlFlow::Continue(());
                }
                let failed = match error {
                    Some(error) => {
                        warn!("⚠️ Error durante la reproducción en guild {}: {}", self.guild_id, error);
                        true
                    }
                    None => false,
                };
                self.track_ended(failed);
            }
            SessionCommand::IdleExpired { generation } => {
                if self.watchdog.is_current(generation)
                    && self.state == SessionState::Draining
                    && self.queue.is_empty()
                    && self.current.is_none()
                {
                    info!("💤 Guild {} inactiva, cerrando sesión", self.guild_id);
                    self.destroy(DestroyReason::IdleTimeout).await;
                    return ControlFlow::Break(());
                }
            }
        }

        ControlFlow::Continue(())
    }

    fn add_track(&mut self, item: QueueItem, reply: Reply<Result<AddOutcome, PlayerError>>) {
        if self.current.is_none() {
            // Idle o Draining: empieza a cargar y responde cuando arranque
            if self.watchdog.is_armed() {
                info!("⏲️ Desconexión por inactividad cancelada en guild {}", self.guild_id);
            }
            self.watchdog.disarm();
            self.start_loading(item, false);
            self.pending_add = Some(reply);
            return;
        }

        let _ = reply.send(self.queue.push(item).map(|position| AddOutcome::Queued { position }));
    }

    fn start_loading(&mut self, item: QueueItem, replay: bool) {
        self.load_id += 1;
        self.replaying = replay;
        if !replay {
            // El panel del track anterior deja de ser válido desde ya
            self.generation += 1;
            self.votes.clear();
        }

        let load_id = self.load_id;
        let track = item.track.clone();
        self.current = Some(item);
        self.state = SessionState::Loading;

        debug!("⏳ Cargando '{}' (load {})", track.title(), load_id);

        let factory = self.factory.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = factory.create_stream(&track).await;
            if let Err(mpsc::error::SendError(command)) = tx.send(SessionCommand::StreamReady { load_id, result }) {
                if let SessionCommand::StreamReady { result: Ok(stream), .. } = command {
                    stream.process.kill();
                }
            }
        });
    }

    async fn stream_ready(&mut self, load_id: u64, result: Result<PlayableStream, StreamStartError>) {
        if load_id != self.load_id || self.state != SessionState::Loading {
            debug!("Carga obsoleta descartada (load {} != {})", load_id, self.load_id);
            if let Ok(stream) = result {
                stream.process.kill();
            }
            return;
        }

        let stream = match result {
            Ok(stream) => stream,
            Err(e) => {
                error!("❌ No se pudo iniciar el stream: {}", e);
                self.reply_pending(Err(PlayerError::StreamStart(e)));
                self.track_ended(true);
                return;
            }
        };

        self.play_id += 1;
        let process = stream.process.clone();
        let events = SinkEvents::new(self.tx.clone(), self.play_id);

        match self.transport.start_playback(stream, self.volume, events).await {
            Ok(playback) => {
                self.playback = Some(playback);
                self.process = Some(process);
                self.state = SessionState::Playing;
            }
            Err(e) => {
                error!("❌ El transporte rechazó la reproducción: {}", e);
                process.kill();
                self.reply_pending(Err(PlayerError::Transport(e)));
                self.track_ended(true);
                return;
            }
        }

        if let Some(item) = &self.current {
            info!("▶️ Reproduciendo en guild {}: {}", self.guild_id, item.track.title());
            let track = item.track.clone();
            self.reply_pending(Ok(AddOutcome::Started(track)));
        }

        if self.replaying {
            self.refresh_control_message().await;
        } else {
            self.publish_control_message().await;
        }
    }

    /// Transición común de fin de track (natural, skip, error)
    fn track_ended(&mut self, failed: bool) {
        self.release_stream();

        if self.looping && !failed {
            if let Some(item) = self.current.clone() {
                info!("🔂 Repitiendo track: {}", item.track.title());
                self.start_loading(item, true);
                return;
            }
        }

        match self.queue.pop_next() {
            Some(next) => self.start_loading(next, false),
            None => self.enter_draining(),
        }
    }

    fn enter_draining(&mut self) {
        self.current = None;
        self.votes.clear();
        self.state = SessionState::Draining;
        self.watchdog.arm(self.settings.idle_timeout);
        info!("📭 Cola terminada en guild {}", self.guild_id);
    }

    /// Detiene sink y proceso, invalidando cualquier evento pendiente
    fn release_stream(&mut self) {
        self.play_id += 1;
        if let Some(playback) = self.playback.take() {
            playback.stop();
        }
        if let Some(process) = self.process.take() {
            process.kill();
        }
    }

    fn reply_pending(&mut self, outcome: Result<AddOutcome, PlayerError>) {
        if let Some(reply) = self.pending_add.take() {
            let _ = reply.send(outcome);
        }
    }

    async fn pause(&mut self) -> Result<(), PlayerError> {
        match self.state {
            SessionState::Playing => {
                if let Some(playback) = &self.playback {
                    playback.pause()?;
                }
                self.state = SessionState::Paused;
                info!("⏸️ Pausado en guild {}", self.guild_id);
                self.refresh_control_message().await;
                Ok(())
            }
            SessionState::Paused => Err(PlayerError::AlreadyPaused),
            _ => Err(PlayerError::NothingPlaying),
        }
    }

    async fn resume(&mut self) -> Result<(), PlayerError> {
        match self.state {
            SessionState::Paused => {
                if let Some(playback) = &self.playback {
                    playback.resume()?;
                }
                self.state = SessionState::Playing;
                info!("▶️ Reanudado en guild {}", self.guild_id);
                self.refresh_control_message().await;
                Ok(())
            }
            SessionState::Playing => Err(PlayerError::NotPaused),
            _ => Err(PlayerError::NothingPlaying),
        }
    }

    async fn skip(&mut self) -> Result<Track, PlayerError> {
        let skipped = match (&self.state, &self.current) {
            (SessionState::Loading | SessionState::Playing | SessionState::Paused, Some(item)) => item.track.clone(),
            _ => return Err(PlayerError::NothingPlaying),
        };

        info!("⏭️ Saltando: {}", skipped.title());

        if self.state == SessionState::Loading {
            // La carga en curso queda obsoleta
            self.load_id += 1;
            self.reply_pending(Ok(AddOutcome::Cancelled));
        }

        self.track_ended(false);
        Ok(skipped)
    }

    async fn vote_skip(&mut self, voter: UserId, required: usize) -> Result<VoteOutcome, PlayerError> {
        if self.current.is_none() {
            return Err(PlayerError::NothingPlaying);
        }

        if !self.votes.insert(voter) {
            return Ok(VoteOutcome::AlreadyVoted {
                votes: self.votes.len(),
                required,
            });
        }

        let votes = self.votes.len();
        debug!("🗳️ Voto de {} ({}/{})", voter, votes, required);

        if votes >= required {
            self.votes.clear();
            let skipped = self.skip().await?;
            return Ok(VoteOutcome::Skipped(skipped));
        }

        Ok(VoteOutcome::Registered { votes, required })
    }

    fn stop(&mut self) {
        self.load_id += 1;
        self.release_stream();
        self.reply_pending(Ok(AddOutcome::Cancelled));
        self.queue.clear();
        self.current = None;
        self.looping = false;
        self.votes.clear();
        self.watchdog.disarm();
        self.state = SessionState::Idle;
        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
    }

    async fn destroy(&mut self, reason: DestroyReason) {
        self.stop();
        self.state = SessionState::Destroyed;

        if reason != DestroyReason::TransportLost {
            self.transport.disconnect().await;
        }

        let instance_id = self.instance_id;
        self.sessions
            .remove_if(&self.guild_id, |_, handle| handle.instance_id() == instance_id);

        info!("👋 Sesión de guild {} destruida ({:?})", self.guild_id, reason);
    }

    async fn set_volume(&mut self, volume: f32) -> f32 {
        let volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { self.volume };
        self.volume = volume;

        if let Some(playback) = &self.playback {
            if let Err(e) = playback.set_volume(volume) {
                warn!("⚠️ No se pudo aplicar el volumen: {}", e);
            }
        }

        info!("🔊 Volumen de guild {}: {}%", self.guild_id, (volume * 100.0).round() as u32);
        self.refresh_control_message().await;
        volume
    }

    async fn set_looping(&mut self, looping: bool) -> bool {
        self.looping = looping;
        if looping {
            info!("🔂 Repetir canción activado");
        } else {
            info!("➡️ Repetición desactivada");
        }
        self.refresh_control_message().await;
        looping
    }

    async fn control_pressed(
        &mut self,
        action: ControlAction,
        generation: u64,
        user: UserId,
        required_votes: usize,
    ) -> Result<ControlOutcome, PlayerError> {
        if generation != self.generation || self.current.is_none() {
            debug!("Botón obsoleto (gen {} != {})", generation, self.generation);
            return Ok(ControlOutcome::Stale);
        }

        match action {
            ControlAction::PauseResume => {
                if self.state == SessionState::Paused {
                    self.resume().await.map(|_| ControlOutcome::Resumed)
                } else {
                    self.pause().await.map(|_| ControlOutcome::Paused)
                }
            }
            ControlAction::Skip => self.skip().await.map(ControlOutcome::Skipped),
            ControlAction::VoteSkip => self.vote_skip(user, required_votes).await.map(ControlOutcome::Vote),
            ControlAction::ToggleLoop => {
                let looping = !self.looping;
                Ok(ControlOutcome::Looping(self.set_looping(looping).await))
            }
            ControlAction::Stop => {
                self.stop();
                Ok(ControlOutcome::Stopped)
            }
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            current: self.current.clone(),
            upcoming: self.queue.iter().cloned().collect(),
            volume: self.volume,
            looping: self.looping,
            skip_votes: self.votes.len(),
            generation: self.generation,
            max_queue_size: self.queue.max_size(),
        }
    }

    fn now_playing(&self) -> Option<NowPlaying> {
        let item = self.current.clone()?;
        Some(NowPlaying {
            item,
            generation: self.generation,
            volume: self.volume,
            looping: self.looping,
            paused: self.state == SessionState::Paused,
            queue_len: self.queue.len(),
        })
    }

    async fn publish_control_message(&mut self) {
        let Some(now_playing) = self.now_playing() else {
            return;
        };

        match self.transport.send_control_message(&now_playing).await {
            Ok(id) => self.control_message = Some(id),
            Err(e) => {
                warn!("⚠️ No se pudo publicar el panel: {}", e);
                self.control_message = None;
            }
        }
    }

    /// Actualiza el panel existente sin cambiar su generación
    async fn refresh_control_message(&mut self) {
        let (Some(id), Some(now_playing)) = (self.control_message, self.now_playing()) else {
            return;
        };

        if let Err(e) = self.transport.update_control_message(id, &now_playing).await {
            warn!("⚠️ No se pudo actualizar el panel: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_required_votes() {
        assert_eq!(required_votes(5, 0.5), 3);
        assert_eq!(required_votes(4, 0.5), 2);
        assert_eq!(required_votes(1, 0.5), 1);
        assert_eq!(required_votes(0, 0.5), 1);
        assert_eq!(required_votes(3, 1.0), 3);
        assert_eq!(required_votes(5, 0.6), 3);
        assert_eq!(required_votes(10, 0.3), 3);
        assert_eq!(required_votes(10, 0.6), 6);
        assert_eq!(required_votes(7, 0.3), 3);
    }

    fn defaults() -> SessionSettings {
        SessionSettings {
            max_queue_size: 100,
            default_volume: 0.5,
            idle_timeout: Duration::from_secs(300),
            vote_threshold: 0.5,
        }
    }

    #[test]
    fn test_guild_settings_override_defaults() {
        let mut provider = MockSettingsProvider::new();
        provider.expect_get_setting().returning(|_, key| match key {
            SettingKey::MaxQueueSize => Some(20.0),
            SettingKey::DefaultVolume => Some(0.8),
            SettingKey::IdleTimeoutSecs => None,
            SettingKey::VoteThreshold => Some(0.75),
        });

        let settings = defaults().for_guild(GuildId::new(1), &provider);

        assert_eq!(settings.max_queue_size, 20);
        assert_eq!(settings.default_volume, 0.8);
        assert_eq!(settings.idle_timeout, Duration::from_secs(300));
        assert_eq!(settings.vote_threshold, 0.75);
    }

    #[test]
    fn test_invalid_guild_settings_are_ignored() {
        let mut provider = MockSettingsProvider::new();
        provider.expect_get_setting().returning(|_, key| match key {
            SettingKey::MaxQueueSize => Some(0.0),
            SettingKey::DefaultVolume => Some(3.0),
            SettingKey::IdleTimeoutSecs => Some(f64::NAN),
            SettingKey::VoteThreshold => Some(-1.0),
        });

        assert_eq!(defaults().for_guild(GuildId::new(1), &provider), defaults());
    }
}
