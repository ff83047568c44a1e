//! Typed errors for the resolution layer, the stream factory and the
//! per-guild playback engine.
//!
//! `Display` output is meant for logs and may contain backend diagnostics.
//! Anything shown to a Discord user goes through `user_message()`, which
//! never leaks stderr dumps or internal details.

use std::time::Duration;
use thiserror::Error;

use crate::{audio::stream::Backend, sources::SourceKind};

/// Fallos al convertir una consulta en un [`Track`](crate::sources::Track)
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("las colecciones de {kind} (playlists, álbumes, artistas) no están soportadas")]
    UnsupportedCollection { kind: SourceKind },

    #[error("sin resultados para `{query}`")]
    NoResults { query: String },

    #[error("{kind}: no se pudo extraer metadata ({reason})")]
    MissingMetadata { kind: SourceKind, reason: String },

    #[error("URL de {kind} inválida: {url}")]
    InvalidUrl { kind: SourceKind, url: String },

    #[error("el resolver de {kind} no está configurado")]
    NotConfigured { kind: SourceKind },

    #[error("error HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("yt-dlp falló: {diagnostics}")]
    Extractor { diagnostics: String },

    #[error("respuesta mal formada: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("la resolución excedió {0:?}")]
    Timeout(Duration),

    #[error("error de E/S: {0}")]
    Io(#[from] std::io::Error),
}

impl ResolutionError {
    /// Short description safe to show to the requester.
    pub fn user_message(&self) -> String {
        match self {
            Self::UnsupportedCollection { kind } => format!(
                "Los enlaces a playlists, álbumes o artistas de {} no están soportados. Usa el enlace de una canción.",
                kind
            ),
            Self::NoResults { .. } => "No se encontraron resultados.".to_string(),
            Self::MissingMetadata { kind, .. } => {
                format!("No se pudo leer la información de la canción en {}.", kind)
            }
            Self::InvalidUrl { kind, .. } => format!("El enlace de {} no es válido.", kind),
            Self::NotConfigured { kind } => format!("{} no está habilitado en este bot.", kind),
            Self::Timeout(_) => "La búsqueda tardó demasiado, inténtalo de nuevo.".to_string(),
            Self::Http(_) | Self::Extractor { .. } | Self::Parse(_) | Self::Io(_) => {
                "No se pudo obtener la canción.".to_string()
            }
        }
    }
}

/// Fallos al arrancar el backend de decodificación de un track
#[derive(Debug, Error)]
pub enum StreamStartError {
    #[error("no se pudo lanzar {backend}: {source}")]
    Spawn {
        backend: Backend,
        #[source]
        source: std::io::Error,
    },

    #[error("{backend} no produjo audio en {timeout:?}: {diagnostics}")]
    Timeout {
        backend: Backend,
        timeout: Duration,
        diagnostics: String,
    },

    #[error("{backend} terminó antes de producir audio ({status}): {diagnostics}")]
    EarlyExit {
        backend: Backend,
        status: String,
        diagnostics: String,
    },

    #[error("error leyendo la salida de {backend}: {source}")]
    Io {
        backend: Backend,
        #[source]
        source: std::io::Error,
    },
}

impl StreamStartError {
    pub fn backend(&self) -> Backend {
        match self {
            Self::Spawn { backend, .. }
            | Self::Timeout { backend, .. }
            | Self::EarlyExit { backend, .. }
            | Self::Io { backend, .. } => *backend,
        }
    }

    /// Stderr captured from the backend, empty when none was collected.
    pub fn diagnostics(&self) -> &str {
        match self {
            Self::Timeout { diagnostics, .. } | Self::EarlyExit { diagnostics, .. } => diagnostics,
            Self::Spawn { .. } | Self::Io { .. } => "",
        }
    }
}

/// Errores de las operaciones del motor de reproducción
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("la cola está llena (máximo {max} canciones)")]
    QueueFull { max: usize },

    #[error("el track no pudo iniciar: {0}")]
    StreamStart(#[from] StreamStartError),

    #[error("no hay nada reproduciéndose")]
    NothingPlaying,

    #[error("la reproducción ya está pausada")]
    AlreadyPaused,

    #[error("la reproducción no está pausada")]
    NotPaused,

    #[error("la sesión ya fue cerrada")]
    SessionClosed,

    #[error("error del transporte: {0}")]
    Transport(#[from] TransportError),
}

impl PlayerError {
    pub fn user_message(&self) -> String {
        match self {
            Self::QueueFull { max } => format!("La cola está llena (máximo {} canciones).", max),
            Self::StreamStart(_) => "No se pudo reproducir la canción.".to_string(),
            Self::NothingPlaying => "No hay nada reproduciéndose.".to_string(),
            Self::AlreadyPaused => "La reproducción ya está pausada.".to_string(),
            Self::NotPaused => "La reproducción no está pausada.".to_string(),
            Self::SessionClosed => "El reproductor ya no está activo.".to_string(),
            Self::Transport(_) => "No se pudo reproducir en el canal de voz.".to_string(),
        }
    }
}

/// Errores del transporte de voz/mensajes (lado Discord)
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no se pudo conectar al canal de voz: {0}")]
    Join(String),

    #[error("error de reproducción en el sink: {0}")]
    Playback(String),

    #[error("no se pudo enviar o editar el mensaje de control: {0}")]
    Message(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages_hide_diagnostics() {
        let err = PlayerError::StreamStart(StreamStartError::EarlyExit {
            backend: Backend::Extractor,
            status: "exit status: 1".to_string(),
            diagnostics: "ERROR: [youtube] abc: Sign in to confirm".to_string(),
        });

        assert!(err.to_string().contains("Sign in"));
        assert!(!err.user_message().contains("Sign in"));
    }

    #[test]
    fn test_collection_message_names_the_service() {
        let err = ResolutionError::UnsupportedCollection {
            kind: SourceKind::SpotifyBridge,
        };
        assert!(err.user_message().contains("Spotify"));
    }
}
