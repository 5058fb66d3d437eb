//! Voice transport seam.
//!
//! [`VoiceConnection`] is everything a guild player needs from the playback
//! engine; [`VoiceGateway`] is the join/move step the command layer runs
//! before a player exists. The songbird implementations live here too.

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::{ControlError, JoinError},
    tracks::TrackHandle,
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::{
    signal::{CompletionSignal, TrackEnd},
    track::Track,
};
use crate::error::VoiceConnectionError;

/// Conexión de voz de un servidor, propiedad exclusiva de su reproductor.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Starts streaming `track`. The engine must complete `done` when the
    /// clip ends, is stopped, or fails mid-stream.
    async fn play(&self, track: &mut Track, done: CompletionSignal)
        -> Result<(), VoiceConnectionError>;

    async fn pause(&self) -> Result<(), VoiceConnectionError>;

    async fn resume(&self) -> Result<(), VoiceConnectionError>;

    /// Detiene el clip actual, si lo hay.
    async fn stop(&self) -> Result<(), VoiceConnectionError>;

    /// Sale del canal. Estar ya desconectado cuenta como éxito.
    async fn disconnect(&self) -> Result<(), VoiceConnectionError>;
}

/// Une el bot al canal de voz del solicitante, o lo mueve si ya estaba en otro.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, VoiceConnectionError>;
}

/// [`VoiceGateway`] sobre el manager de songbird.
pub struct SongbirdGateway {
    manager: Arc<Songbird>,
}

impl SongbirdGateway {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, VoiceConnectionError> {
        // songbird mueve la llamada existente si el bot ya está en otro canal
        let call = self.manager.join(guild_id, channel_id).await.map_err(|e| {
            error!("Error al obtener handler de voz: {:?}", e);
            VoiceConnectionError::from(e)
        })?;

        info!("🔊 Conectado al canal {} en guild {}", channel_id, guild_id);
        Ok(Arc::new(SongbirdConnection::new(
            self.manager.clone(),
            guild_id,
            call,
        )))
    }
}

/// [`VoiceConnection`] sobre una `Call` de songbird.
pub struct SongbirdConnection {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    call: Arc<Mutex<Call>>,
    current: SyncMutex<Option<TrackHandle>>,
}

impl SongbirdConnection {
    pub fn new(manager: Arc<Songbird>, guild_id: GuildId, call: Arc<Mutex<Call>>) -> Self {
        Self {
            manager,
            guild_id,
            call,
            current: SyncMutex::new(None),
        }
    }

    fn current_handle(&self) -> Result<TrackHandle, VoiceConnectionError> {
        self.current
            .lock()
            .clone()
            .ok_or(VoiceConnectionError::NotConnected)
    }
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    async fn play(
        &self,
        track: &mut Track,
        done: CompletionSignal,
    ) -> Result<(), VoiceConnectionError> {
        let input = track.stream_mut().open()?;

        let handle = {
            let mut call = self.call.lock().await;
            if call.current_channel().is_none() {
                return Err(VoiceConnectionError::NotConnected);
            }
            call.play_only_input(input)
        };
        // guardado antes de los eventos: si fallan, `stop` todavía alcanza al clip
        *self.current.lock() = Some(handle.clone());

        handle.add_event(
            Event::Track(TrackEvent::End),
            CompletionNotifier {
                guild_id: self.guild_id,
                done: done.clone(),
                cause: TrackEnd::Finished,
            },
        )?;
        handle.add_event(
            Event::Track(TrackEvent::Error),
            CompletionNotifier {
                guild_id: self.guild_id,
                done,
                cause: TrackEnd::Failed("error del motor de audio".into()),
            },
        )?;

        debug!("▶️ Enviando al motor: {}", track.info().title);
        Ok(())
    }

    async fn pause(&self) -> Result<(), VoiceConnectionError> {
        self.current_handle()?.pause()?;
        Ok(())
    }

    async fn resume(&self) -> Result<(), VoiceConnectionError> {
        self.current_handle()?.play()?;
        Ok(())
    }

    async fn stop(&self) -> Result<(), VoiceConnectionError> {
        let handle = self.current.lock().take();
        if let Some(handle) = handle {
            match handle.stop() {
                Ok(()) | Err(ControlError::Finished) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), VoiceConnectionError> {
        self.current.lock().take();
        match self.manager.remove(self.guild_id).await {
            Ok(()) => {
                info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
                Ok(())
            }
            Err(JoinError::NoCall) => {
                debug!("Guild {} ya estaba desconectada", self.guild_id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Completa la señal de la pista cuando songbird avisa fin o error.
struct CompletionNotifier {
    guild_id: GuildId,
    done: CompletionSignal,
    cause: TrackEnd,
}

#[async_trait]
impl VoiceEventHandler for CompletionNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        if self.done.complete(self.cause.clone()) {
            debug!("Track terminado en guild {}: {:?}", self.guild_id, self.cause);
        }
        Some(Event::Cancel)
    }
}
