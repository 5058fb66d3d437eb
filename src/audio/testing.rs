//! Fakes shared by the audio unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use songbird::input::Input;
use std::{sync::Arc, time::Duration};

use super::{
    engine::{VoiceConnection, VoiceGateway},
    events::{PlayerEvents, TeardownReason},
    player::PlayerSettings,
    signal::{CompletionSignal, TrackEnd},
    track::{StreamSource, Track, TrackInfo},
};
use crate::error::VoiceConnectionError;

/// Registro ordenado de lo que hicieron los fakes.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.0.lock().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

pub fn user(id: u64) -> UserId {
    UserId::new(id)
}

pub fn guild(id: u64) -> GuildId {
    GuildId::new(id)
}

pub fn channel(id: u64) -> ChannelId {
    ChannelId::new(id)
}

pub fn settings() -> PlayerSettings {
    PlayerSettings {
        idle_timeout: Duration::from_secs(300),
        shutdown_grace: Duration::from_secs(1),
        preview_len: 5,
    }
}

pub struct FakeStream {
    name: String,
    journal: Journal,
}

impl FakeStream {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            journal: journal.clone(),
        }
    }
}

impl StreamSource for FakeStream {
    fn open(&mut self) -> Result<Input, VoiceConnectionError> {
        Err(VoiceConnectionError::Stream("fake sin audio".into()))
    }

    fn release(&mut self) {
        self.journal.push(format!("release:{}", self.name));
    }
}

pub fn track(name: &str, journal: &Journal) -> Track {
    Track::new(
        TrackInfo::new(name, format!("https://example.com/{name}"), user(7)),
        FakeStream::new(name, journal),
    )
}

/// Motor de voz falso: nunca termina una pista por sí solo.
#[derive(Default)]
pub struct FakeVoice {
    journal: Journal,
    current: Mutex<Option<CompletionSignal>>,
    failing: Mutex<Vec<String>>,
    disconnect_delay: Mutex<Option<Duration>>,
    end_on_pause: Mutex<bool>,
}

impl FakeVoice {
    pub fn new(journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            journal: journal.clone(),
            ..Default::default()
        })
    }

    /// Hace que `play` falle para la pista con este título.
    pub fn fail_on(&self, title: &str) {
        self.failing.lock().push(title.to_string());
    }

    /// Hace que `disconnect` tarde `delay` en volver.
    pub fn slow_disconnect(&self, delay: Duration) {
        *self.disconnect_delay.lock() = Some(delay);
    }

    /// El próximo `pause` termina la pista en curso y vuelve cuando ya suena la siguiente.
    pub fn end_track_on_pause(&self) {
        *self.end_on_pause.lock() = true;
    }

    /// Simula el fin natural del clip actual.
    pub fn finish_current(&self) -> bool {
        match self.current.lock().take() {
            Some(signal) => signal.complete(TrackEnd::Finished),
            None => false,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|signal| !signal.is_complete())
    }
}

#[async_trait]
impl VoiceConnection for FakeVoice {
    async fn play(
        &self,
        track: &mut Track,
        done: CompletionSignal,
    ) -> Result<(), VoiceConnectionError> {
        let title = track.info().title.clone();
        if self.failing.lock().contains(&title) {
            self.journal.push(format!("fail:{title}"));
            return Err(VoiceConnectionError::Stream(format!("no se pudo abrir {title}")));
        }
        self.journal.push(format!("play:{title}"));
        *self.current.lock() = Some(done);
        Ok(())
    }

    async fn pause(&self) -> Result<(), VoiceConnectionError> {
        self.journal.push("pause");
        if std::mem::take(&mut *self.end_on_pause.lock()) {
            self.finish_current();
            wait_until(|| self.is_playing()).await;
        }
        Ok(())
    }

    async fn resume(&self) -> Result<(), VoiceConnectionError> {
        self.journal.push("resume");
        Ok(())
    }

    async fn stop(&self) -> Result<(), VoiceConnectionError> {
        self.journal.push("stop");
        self.current.lock().take();
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), VoiceConnectionError> {
        self.journal.push("disconnect");
        let delay = *self.disconnect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

/// Gateway falso: siempre entrega el mismo [`FakeVoice`].
pub struct FakeGateway {
    journal: Journal,
    pub voice: Arc<FakeVoice>,
}

impl FakeGateway {
    pub fn new(journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            journal: journal.clone(),
            voice: FakeVoice::new(journal),
        })
    }
}

#[async_trait]
impl VoiceGateway for FakeGateway {
    async fn connect(
        &self,
        _guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, VoiceConnectionError> {
        self.journal.push(format!("connect:{channel_id}"));
        Ok(self.voice.clone())
    }
}

pub struct RecordingEvents {
    journal: Journal,
}

impl RecordingEvents {
    pub fn new(journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            journal: journal.clone(),
        })
    }
}

#[async_trait]
impl PlayerEvents for RecordingEvents {
    async fn track_started(&self, _guild_id: GuildId, track: &TrackInfo) {
        self.journal.push(format!("started:{}", track.title));
    }

    async fn track_ended(&self, _guild_id: GuildId, track: &TrackInfo, cause: &TrackEnd) {
        self.journal.push(format!("ended:{}:{:?}", track.title, cause));
    }

    async fn player_closed(&self, _guild_id: GuildId, reason: TeardownReason) {
        self.journal.push(format!("closed:{reason:?}"));
    }
}

/// Espera (con reloj de tokio) hasta que `condition` se cumpla.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("la condición no se cumplió a tiempo");
}
