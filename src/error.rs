//! Error types shared by the playback core.
//!
//! The Discord adapters and `main` keep using [`anyhow::Result`]; everything
//! below the command layer reports one of these typed errors so callers can
//! tell a user mistake (no voice channel, nothing found) from an engine fault.

use std::fmt;

use thiserror::Error;

use crate::audio::track::Track;

/// Errores visibles para el usuario al operar sobre un reproductor.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Debes estar en un canal de voz")]
    NoVoiceChannel,

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("El reproductor de este servidor se está cerrando, inténtalo de nuevo")]
    PlayerGone,

    #[error(transparent)]
    VoiceConnection(#[from] VoiceConnectionError),

    #[error("No hay ningún reproductor activo en este servidor")]
    NoActivePlayer,
}

/// Fallos del resolvedor al convertir una búsqueda en un [`Track`].
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("yt-dlp error: {0}")]
    Backend(String),

    #[error("No se encontraron resultados para `{0}`")]
    NoResults(String),

    #[error("Contenido no permitido: {0}")]
    Disallowed(String),

    #[error("Error al ejecutar yt-dlp: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error al parsear respuesta de yt-dlp: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Fallos del motor de voz (conexión, control de pista o apertura del stream).
#[derive(Debug, Error)]
pub enum VoiceConnectionError {
    #[error("Error al conectar al canal de voz: {0}")]
    Join(#[from] songbird::error::JoinError),

    #[error("Error de control de pista: {0}")]
    Control(#[from] songbird::error::ControlError),

    #[error("No hay conexión de voz activa")]
    NotConnected,

    #[error("No se pudo abrir el stream: {0}")]
    Stream(String),
}

/// Returned by [`GuildPlayer::enqueue`](crate::audio::player::GuildPlayer::enqueue)
/// when the player is already tearing down. Hands the track back so the
/// caller can retry against a fresh player.
#[derive(Error)]
#[error("guild player is disconnecting")]
pub struct PlayerGone(pub Track);

impl fmt::Debug for PlayerGone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PlayerGone").field(&self.0.info().title).finish()
    }
}

impl From<PlayerGone> for PlayerError {
    fn from(_: PlayerGone) -> Self {
        PlayerError::PlayerGone
    }
}
