use dashmap::{mapref::entry::Entry, DashMap};
use futures::future::join_all;
use serenity::model::id::GuildId;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tracing::info;

use super::{
    session::{spawn_session, DestroyReason, SessionHandle, SessionSettings, SettingsProvider},
    stream::StreamFactory,
    transport::Transport,
};

/// Registro de sesiones activas, una por guild
pub struct SessionRegistry {
    sessions: Arc<DashMap<GuildId, SessionHandle>>,
    factory: Arc<dyn StreamFactory>,
    settings: Arc<dyn SettingsProvider>,
    defaults: SessionSettings,
    next_instance: AtomicU64,
}

impl SessionRegistry {
    pub fn new(
        factory: Arc<dyn StreamFactory>,
        settings: Arc<dyn SettingsProvider>,
        defaults: SessionSettings,
    ) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            factory,
            settings,
            defaults,
            next_instance: AtomicU64::new(1),
        }
    }

    /// Sesión viva de la guild, si existe
    pub fn get(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.sessions
            .get(&guild_id)
            .map(|entry| entry.value().clone())
            .filter(|handle| !handle.is_closed())
    }

    /// Devuelve la sesión existente o crea una con el transporte dado.
    ///
    /// `transport` is only called when a new session is actually created.
    pub fn get_or_create(
        &self,
        guild_id: GuildId,
        transport: impl FnOnce() -> Arc<dyn Transport>,
    ) -> SessionHandle {
        match self.sessions.entry(guild_id) {
            // Una sesión que terminó pero aún no se quitó del mapa se reemplaza
            Entry::Occupied(mut entry) if entry.get().is_closed() => {
                let handle = self.spawn(guild_id, transport);
                entry.insert(handle.clone());
                handle
            }
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let handle = self.spawn(guild_id, transport);
                entry.insert(handle.clone());
                handle
            }
        }
    }

    fn spawn(&self, guild_id: GuildId, transport: impl FnOnce() -> Arc<dyn Transport>) -> SessionHandle {
        let instance_id = self.next_instance.fetch_add(1, Ordering::Relaxed);
        let settings = self.defaults.for_guild(guild_id, self.settings.as_ref());

        spawn_session(
            guild_id,
            instance_id,
            settings,
            transport(),
            self.factory.clone(),
            self.sessions.clone(),
        )
    }

    /// El transporte de la guild se perdió (desconexión del canal de voz)
    pub fn transport_lost(&self, guild_id: GuildId) {
        if let Some(handle) = self.get(guild_id) {
            info!("🔌 Transporte perdido en guild {}", guild_id);
            handle.destroy_detached(DestroyReason::TransportLost);
        }
    }

    /// Destruye todas las sesiones y espera a que terminen
    pub async fn shutdown(&self) {
        let handles: Vec<_> = self.sessions.iter().map(|entry| entry.value().clone()).collect();
        info!("🛑 Cerrando {} sesiones", handles.len());

        join_all(handles.iter().map(|handle| handle.destroy(DestroyReason::Shutdown))).await;
        self.sessions.clear();
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
