use async_trait::async_trait;
use serenity::model::id::GuildId;
use std::fmt;

use super::{signal::TrackEnd, track::TrackInfo};

/// Por qué se cerró un reproductor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownReason {
    /// La cola estuvo vacía durante todo el `idle_timeout`.
    IdleTimeout,
    /// Comando `/disconnect`.
    Disconnected,
    /// El bot fue sacado del canal de voz desde fuera.
    ConnectionLost,
    /// Apagado del proceso.
    Shutdown,
}

impl fmt::Display for TeardownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TeardownReason::IdleTimeout => "inactividad",
            TeardownReason::Disconnected => "desconexión solicitada",
            TeardownReason::ConnectionLost => "conexión de voz perdida",
            TeardownReason::Shutdown => "apagado",
        };
        f.write_str(text)
    }
}

/// Notifications from a guild player to the presentation layer.
///
/// The core never formats or sends messages itself; implementations decide
/// how to render a "now playing" indicator and when to remove it.
#[async_trait]
pub trait PlayerEvents: Send + Sync {
    async fn track_started(&self, guild_id: GuildId, track: &TrackInfo);

    async fn track_ended(&self, guild_id: GuildId, track: &TrackInfo, cause: &TrackEnd);

    async fn player_closed(&self, guild_id: GuildId, reason: TeardownReason);
}
