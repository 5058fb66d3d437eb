use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    engine::VoiceGateway,
    events::{PlayerEvents, TeardownReason},
    player::{GuildBinding, GuildPlayer, PlayerSnapshot},
    registry::PlayerRegistry,
    track::TrackInfo,
};
use crate::{
    error::{PlayerError, PlayerGone},
    sources::TrackResolver,
};

/// Una petición de `/play` ya extraída de la interacción.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub guild_id: GuildId,
    /// Canal de voz actual del solicitante, si está en alguno.
    pub voice_channel: Option<ChannelId>,
    pub query: String,
    pub requested_by: UserId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Enqueued {
    pub info: TrackInfo,
    /// Posición en la cola (1 = la siguiente en sonar).
    pub position: usize,
}

/// Entry point for the command layer.
///
/// Ties the resolver, the voice gateway and the registry together so that
/// slash commands never touch a player directly.
pub struct MusicService {
    registry: Arc<PlayerRegistry>,
    resolver: Arc<dyn TrackResolver>,
    gateway: Arc<dyn VoiceGateway>,
}

impl MusicService {
    pub fn new(
        registry: Arc<PlayerRegistry>,
        resolver: Arc<dyn TrackResolver>,
        gateway: Arc<dyn VoiceGateway>,
    ) -> Self {
        Self {
            registry,
            resolver,
            gateway,
        }
    }

    pub fn registry(&self) -> &Arc<PlayerRegistry> {
        &self.registry
    }

    /// Resuelve la búsqueda, conecta al canal del usuario y encola la pista.
    pub async fn enqueue(
        &self,
        request: EnqueueRequest,
        events: Arc<dyn PlayerEvents>,
    ) -> Result<Enqueued, PlayerError> {
        let guild_id = request.guild_id;
        let channel_id = request.voice_channel.ok_or(PlayerError::NoVoiceChannel)?;

        let mut track = self
            .resolver
            .resolve(&request.query, request.requested_by)
            .await?;
        let info = track.info().clone();

        // Un segundo intento por si el reproductor estaba cerrándose.
        for attempt in 1..=2 {
            let voice = self.gateway.connect(guild_id, channel_id).await?;
            let events = events.clone();
            let player = self
                .registry
                .get_or_create(guild_id, move || GuildBinding { voice, events });

            match player.enqueue(track) {
                Ok(position) => {
                    info!(
                        "➕ {} en guild {} (posición {})",
                        info.title, guild_id, position
                    );
                    return Ok(Enqueued { info, position });
                }
                Err(PlayerGone(back)) => {
                    debug!(
                        "Reproductor de guild {} cerrándose (intento {}), esperando",
                        guild_id, attempt
                    );
                    player.closed().await;
                    track = back;
                }
            }
        }

        warn!("❌ No se pudo encolar {} en guild {}", info.title, guild_id);
        Err(PlayerError::PlayerGone)
    }

    pub async fn pause(&self, guild_id: GuildId) -> Result<bool, PlayerError> {
        self.active(guild_id)?.pause().await
    }

    pub async fn resume(&self, guild_id: GuildId) -> Result<bool, PlayerError> {
        self.active(guild_id)?.resume().await
    }

    pub fn skip(&self, guild_id: GuildId) -> Result<bool, PlayerError> {
        Ok(self.active(guild_id)?.skip())
    }

    pub async fn disconnect(&self, guild_id: GuildId) -> Result<(), PlayerError> {
        if self
            .registry
            .close(guild_id, TeardownReason::Disconnected)
            .await
        {
            Ok(())
        } else {
            Err(PlayerError::NoActivePlayer)
        }
    }

    pub fn status(&self, guild_id: GuildId) -> Option<PlayerSnapshot> {
        self.registry
            .lookup(guild_id)
            .map(|player| player.snapshot())
    }

    /// El bot salió del canal de voz por causas externas.
    pub async fn connection_lost(&self, guild_id: GuildId) -> bool {
        self.registry
            .close(guild_id, TeardownReason::ConnectionLost)
            .await
    }

    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }

    fn active(&self, guild_id: GuildId) -> Result<Arc<GuildPlayer>, PlayerError> {
        self.registry
            .lookup(guild_id)
            .ok_or(PlayerError::NoActivePlayer)
    }
}
