use anyhow::Result;
use parking_lot::Mutex;
use serenity::{
    async_trait,
    builder::{CreateEmbed, CreateMessage},
    http::Http,
    model::id::{ChannelId, GuildId, MessageId},
};
use std::sync::Arc;
use tracing::{debug, error};

use crate::{
    audio::{
        events::{PlayerEvents, TeardownReason},
        signal::TrackEnd,
        track::TrackInfo,
    },
    ui::embeds,
};

/// Publica el "now playing" en el canal de texto donde se pidió la música y
/// lo borra cuando la pista termina.
pub struct ChannelNotifier {
    http: Arc<Http>,
    channel_id: ChannelId,
    now_playing: Mutex<Option<MessageId>>,
}

impl ChannelNotifier {
    pub fn new(http: Arc<Http>, channel_id: ChannelId) -> Arc<Self> {
        Arc::new(Self {
            http,
            channel_id,
            now_playing: Mutex::new(None),
        })
    }

    async fn send(&self, embed: CreateEmbed) -> Result<MessageId> {
        let message = self
            .channel_id
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await?;
        Ok(message.id)
    }

    async fn delete_now_playing(&self) {
        let message_id = self.now_playing.lock().take();
        if let Some(message_id) = message_id {
            if let Err(e) = self.channel_id.delete_message(&self.http, message_id).await {
                debug!("No se pudo borrar el mensaje now playing: {:?}", e);
            }
        }
    }
}

#[async_trait]
impl PlayerEvents for ChannelNotifier {
    async fn track_started(&self, guild_id: GuildId, track: &TrackInfo) {
        match self.send(embeds::create_now_playing_embed(track)).await {
            Ok(message_id) => *self.now_playing.lock() = Some(message_id),
            Err(e) => error!(
                "Error al enviar mensaje now playing en guild {}: {:?}",
                guild_id, e
            ),
        }
    }

    async fn track_ended(&self, guild_id: GuildId, track: &TrackInfo, cause: &TrackEnd) {
        self.delete_now_playing().await;

        if let TrackEnd::Failed(reason) = cause {
            let embed = embeds::create_error_embed(
                "Error de reproducción",
                &format!("No se pudo reproducir **{}**: {}", track.title, reason),
            );
            if let Err(e) = self.send(embed).await {
                error!("Error al avisar fallo en guild {}: {:?}", guild_id, e);
            }
        }
    }

    async fn player_closed(&self, guild_id: GuildId, reason: TeardownReason) {
        self.delete_now_playing().await;

        // /disconnect ya responde en la interacción; al apagar no molestamos
        if matches!(reason, TeardownReason::Disconnected | TeardownReason::Shutdown) {
            return;
        }
        if let Err(e) = self.send(embeds::create_disconnected_embed(reason)).await {
            error!("Error al avisar desconexión en guild {}: {:?}", guild_id, e);
        }
    }
}
