use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use std::{
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use tokio::{sync::Notify, task::JoinHandle, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    engine::VoiceConnection,
    events::{PlayerEvents, TeardownReason},
    queue::TrackQueue,
    registry::PlayerRegistry,
    signal::{CompletionSignal, TrackEnd},
    track::{Track, TrackInfo},
};
use crate::error::{PlayerError, PlayerGone};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// Conectado, esperando la siguiente pista.
    Idle,
    /// Hay una pista en el motor (posiblemente pausada).
    Playing,
    /// Cerrándose; no acepta más pistas.
    Disconnecting,
}

#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub idle_timeout: Duration,
    pub shutdown_grace: Duration,
    pub preview_len: usize,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            shutdown_grace: Duration::from_secs(5),
            preview_len: 5,
        }
    }
}

/// Copia de solo lectura del estado de un reproductor.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub state: PlayerState,
    pub current: Option<TrackInfo>,
    pub paused: bool,
    pub upcoming: Vec<TrackInfo>,
    pub queued: usize,
    pub last_activity: DateTime<Utc>,
}

/// Lo que un reproductor recibe al crearse: su conexión de voz y a quién avisar.
pub struct GuildBinding {
    pub voice: Arc<dyn VoiceConnection>,
    pub events: Arc<dyn PlayerEvents>,
}

struct Inner {
    state: PlayerState,
    queue: TrackQueue,
    current: Option<TrackInfo>,
    signal: Option<CompletionSignal>,
    paused: bool,
    /// Sube con cada pista que sale de la cola.
    generation: u64,
    last_activity: DateTime<Utc>,
}

/// One guild's playback: a FIFO queue drained by a single loop task.
///
/// Everything that touches the queue or `current` goes through `inner`, a
/// sync mutex that is never held across an `.await`. The voice connection is
/// only driven by the loop task, except for pause/resume which forward to
/// the engine directly.
pub struct GuildPlayer {
    serial: u64,
    guild_id: GuildId,
    settings: PlayerSettings,
    voice: Arc<dyn VoiceConnection>,
    events: Arc<dyn PlayerEvents>,
    inner: Mutex<Inner>,
    queue_ready: Notify,
    shutdown: CancellationToken,
    closed: CancellationToken,
    close_reason: Mutex<Option<TeardownReason>>,
    task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    torn_down: AtomicBool,
    finished: AtomicBool,
    registry: Weak<PlayerRegistry>,
}

impl GuildPlayer {
    pub fn new(
        serial: u64,
        guild_id: GuildId,
        settings: PlayerSettings,
        binding: GuildBinding,
        shutdown: CancellationToken,
        registry: Weak<PlayerRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            serial,
            guild_id,
            settings,
            voice: binding.voice,
            events: binding.events,
            inner: Mutex::new(Inner {
                state: PlayerState::Idle,
                queue: TrackQueue::new(),
                current: None,
                signal: None,
                paused: false,
                generation: 0,
                last_activity: Utc::now(),
            }),
            queue_ready: Notify::new(),
            shutdown,
            closed: CancellationToken::new(),
            close_reason: Mutex::new(None),
            task: Mutex::new(None),
            started: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            registry,
        })
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn state(&self) -> PlayerState {
        self.inner.lock().state
    }

    /// Lanza el loop de reproducción. Llamadas repetidas no hacen nada.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let player = self.clone();
        let handle = tokio::spawn(async move { player.run().await });
        *self.task.lock() = Some(handle);
    }

    /// Agrega un track a la cola y devuelve su posición (1 = siguiente).
    ///
    /// A player that is already disconnecting hands the track back.
    pub fn enqueue(&self, track: Track) -> Result<usize, PlayerGone> {
        let position = {
            let mut inner = self.inner.lock();
            if inner.state == PlayerState::Disconnecting {
                return Err(PlayerGone(track));
            }
            inner.last_activity = Utc::now();
            inner.queue.push(track)
        };
        self.queue_ready.notify_one();
        Ok(position)
    }

    /// Pausa la reproducción actual. `false` si no había nada que pausar.
    pub async fn pause(&self) -> Result<bool, PlayerError> {
        let Some(generation) = self.current_generation(false) else {
            return Ok(false);
        };
        self.voice.pause().await?;

        let paused = self.set_paused(generation, true);
        if paused {
            info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
        }
        Ok(paused)
    }

    /// Reanuda la reproducción. `false` si no estaba pausada.
    pub async fn resume(&self) -> Result<bool, PlayerError> {
        let Some(generation) = self.current_generation(true) else {
            return Ok(false);
        };
        self.voice.resume().await?;

        let resumed = self.set_paused(generation, false);
        if resumed {
            info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
        }
        Ok(resumed)
    }

    /// Generación de la pista en curso si su estado de pausa es `paused`.
    fn current_generation(&self, paused: bool) -> Option<u64> {
        let inner = self.inner.lock();
        (inner.state == PlayerState::Playing && inner.paused == paused).then_some(inner.generation)
    }

    /// Aplica la pausa solo si la pista no cambió mientras hablábamos con el motor.
    fn set_paused(&self, generation: u64, paused: bool) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation || inner.current.is_none() {
            debug!("La pista terminó durante pausa/reanudación en guild {}", self.guild_id);
            return false;
        }
        inner.paused = paused;
        inner.last_activity = Utc::now();
        true
    }

    /// Termina la pista actual; el loop pasa a la siguiente.
    pub fn skip(&self) -> bool {
        let mut inner = self.inner.lock();
        let Some(signal) = inner.signal.as_ref() else {
            return false;
        };
        let skipped = signal.complete(TrackEnd::Skipped);
        if skipped {
            inner.last_activity = Utc::now();
            info!("⏭️ Canción saltada en guild {}", self.guild_id);
        }
        skipped
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        let inner = self.inner.lock();
        PlayerSnapshot {
            state: inner.state,
            current: inner.current.clone(),
            paused: inner.paused,
            upcoming: inner.queue.peek(self.settings.preview_len),
            queued: inner.queue.len(),
            last_activity: inner.last_activity,
        }
    }

    /// Cierra el reproductor desde cualquier estado y espera la limpieza.
    ///
    /// If the loop does not finish within `shutdown_grace` it is aborted and
    /// whatever part of the teardown it did not reach runs here instead.
    pub async fn close(self: &Arc<Self>, reason: TeardownReason) {
        self.inner.lock().state = PlayerState::Disconnecting;
        self.close_reason.lock().get_or_insert(reason);
        self.shutdown.cancel();

        let task = self.task.lock().take();
        match task {
            Some(handle) => {
                let abort = handle.abort_handle();
                match timeout(self.settings.shutdown_grace, handle).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!("💥 Loop de guild {} terminó con error: {}", self.guild_id, e),
                    Err(_) => {
                        warn!(
                            "⏱️ Loop de guild {} no terminó en {:?}, abortando",
                            self.guild_id, self.settings.shutdown_grace
                        );
                        abort.abort();
                    }
                }
                // no-op si el loop ya hizo la limpieza
                self.force_close(self.requested_reason()).await;
            }
            None if !self.started.load(Ordering::SeqCst) => {
                self.force_close(self.requested_reason()).await;
            }
            None => {
                // otro llamador ya está esperando al loop
                if timeout(self.settings.shutdown_grace, self.closed.cancelled())
                    .await
                    .is_err()
                {
                    self.force_close(self.requested_reason()).await;
                }
            }
        }
    }

    /// Espera a que termine la limpieza, como mucho `shutdown_grace`.
    pub async fn closed(&self) {
        let _ = timeout(self.settings.shutdown_grace, self.closed.cancelled()).await;
    }

    #[allow(dead_code)]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    fn requested_reason(&self) -> TeardownReason {
        (*self.close_reason.lock()).unwrap_or(TeardownReason::Shutdown)
    }

    async fn run(self: Arc<Self>) {
        info!("🎶 Reproductor iniciado para guild {}", self.guild_id);
        let _guard = LoopGuard(self.clone());

        let reason = loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break self.requested_reason(),
                next = timeout(self.settings.idle_timeout, self.next_track()) => next,
            };

            let (mut track, signal) = match next {
                Ok(next) => next,
                Err(_) if self.begin_idle_teardown() => break TeardownReason::IdleTimeout,
                // un enqueue le ganó al timeout
                Err(_) => continue,
            };

            let info = track.info().clone();
            let cause = match AssertUnwindSafe(self.play_one(&mut track, &signal))
                .catch_unwind()
                .await
            {
                Ok(cause) => cause,
                Err(_) => {
                    error!("💥 Pánico reproduciendo {} en guild {}", info.title, self.guild_id);
                    signal.complete(TrackEnd::Failed("pánico durante la reproducción".into()));
                    signal.wait().await
                }
            };

            track.release();
            self.finish_current();
            self.events.track_ended(self.guild_id, &info, &cause).await;

            if self.shutdown.is_cancelled() {
                break self.requested_reason();
            }
        };

        self.teardown(reason).await;
    }

    /// Espera el siguiente track; el pop y `current` cambian bajo el mismo lock.
    async fn next_track(&self) -> (Track, CompletionSignal) {
        loop {
            if let Some(next) = self.take_next() {
                return next;
            }
            // notify_one guarda el permiso si nadie espera todavía
            self.queue_ready.notified().await;
        }
    }

    fn take_next(&self) -> Option<(Track, CompletionSignal)> {
        let mut inner = self.inner.lock();
        if inner.state == PlayerState::Disconnecting {
            return None;
        }
        let track = inner.queue.pop()?;
        let signal = CompletionSignal::new();
        inner.state = PlayerState::Playing;
        inner.current = Some(track.info().clone());
        inner.signal = Some(signal.clone());
        inner.paused = false;
        inner.generation += 1;
        inner.last_activity = Utc::now();
        Some((track, signal))
    }

    fn begin_idle_teardown(&self) -> bool {
        let mut inner = self.inner.lock();
        if !inner.queue.is_empty() {
            return false;
        }
        inner.state = PlayerState::Disconnecting;
        true
    }

    async fn play_one(&self, track: &mut Track, signal: &CompletionSignal) -> TrackEnd {
        let info = track.info().clone();
        match self.voice.play(track, signal.clone()).await {
            Ok(()) => {
                info!("🎵 Reproduciendo: {} en guild {}", info.title, self.guild_id);
                self.events.track_started(self.guild_id, &info).await;
            }
            Err(e) => {
                warn!("❌ No se pudo reproducir {}: {}", info.title, e);
                signal.complete(TrackEnd::Failed(e.to_string()));
            }
        }

        let cause = tokio::select! {
            cause = signal.wait() => cause,
            _ = self.shutdown.cancelled() => {
                signal.complete(TrackEnd::Stopped);
                signal.wait().await
            }
        };

        if let Err(e) = self.voice.stop().await {
            debug!("Error deteniendo clip en guild {}: {}", self.guild_id, e);
        }
        cause
    }

    fn finish_current(&self) {
        let mut inner = self.inner.lock();
        inner.current = None;
        inner.signal = None;
        inner.paused = false;
        inner.last_activity = Utc::now();
        if inner.state == PlayerState::Playing {
            inner.state = PlayerState::Idle;
        }
    }

    /// Desconecta, libera y termina con [`finish`](Self::finish). Solo corre una vez.
    async fn teardown(&self, reason: TeardownReason) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let drained = {
            let mut inner = self.inner.lock();
            inner.state = PlayerState::Disconnecting;
            inner.current = None;
            inner.paused = false;
            if let Some(signal) = inner.signal.take() {
                signal.complete(TrackEnd::Stopped);
            }
            inner.queue.drain()
        };

        match timeout(self.settings.shutdown_grace, self.voice.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Error desconectando guild {}: {}", self.guild_id, e),
            Err(_) => warn!(
                "⏱️ Desconexión de guild {} no respondió en {:?}",
                self.guild_id, self.settings.shutdown_grace
            ),
        }

        for mut track in drained {
            track.release();
        }

        self.finish(reason).await;
    }

    /// Sale del registro y avisa. Solo corre una vez.
    async fn finish(&self, reason: TeardownReason) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }

        self.evict();
        info!("👋 Reproductor de guild {} cerrado ({})", self.guild_id, reason);
        self.events.player_closed(self.guild_id, reason).await;
        self.closed.cancel();
    }

    /// Limpieza completa aunque el loop haya muerto a mitad de `teardown`.
    async fn force_close(&self, reason: TeardownReason) {
        self.teardown(reason).await;
        self.finish(reason).await;
    }

    fn evict(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.evict(self.guild_id, self.serial);
        }
    }
}

/// Vive dentro del loop: si la tarea muere sin cerrar (pánico o abort), el guild
/// sale del registro en el acto y la limpieza sigue en otra tarea.
struct LoopGuard(Arc<GuildPlayer>);

impl Drop for LoopGuard {
    fn drop(&mut self) {
        let player = &self.0;
        if player.finished.load(Ordering::SeqCst) {
            return;
        }

        warn!("💥 Loop de guild {} terminó sin cerrar, limpiando", player.guild_id);
        player.inner.lock().state = PlayerState::Disconnecting;
        player.evict();

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let player = player.clone();
            let reason = (*player.close_reason.lock()).unwrap_or(TeardownReason::ConnectionLost);
            runtime.spawn(async move { player.force_close(reason).await });
        }
    }
}
