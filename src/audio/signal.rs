use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Motivo por el que terminó una pista.
///
/// The player loop reacts to every cause the same way; the cause is only
/// forwarded to [`PlayerEvents::track_ended`](super::events::PlayerEvents::track_ended).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackEnd {
    /// El motor llegó al final del stream.
    Finished,
    /// Un usuario pidió `/skip`.
    Skipped,
    /// El motor no pudo reproducir la pista.
    Failed(String),
    /// Desconexión o apagado del proceso.
    Stopped,
}

/// Single-slot completion notification for one in-flight track.
///
/// Any holder (the engine's end/error handlers, `/skip`, teardown) may call
/// [`complete`](Self::complete); only the first cause is kept. Waiting after
/// completion returns immediately, so there is no missed-wakeup window.
#[derive(Debug, Clone, Default)]
pub struct CompletionSignal {
    token: CancellationToken,
    cause: Arc<Mutex<Option<TrackEnd>>>,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marca la pista como terminada. Devuelve `false` si ya lo estaba.
    pub fn complete(&self, cause: TrackEnd) -> bool {
        {
            let mut slot = self.cause.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(cause);
        }
        self.token.cancel();
        true
    }

    #[allow(dead_code)]
    pub fn is_complete(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn wait(&self) -> TrackEnd {
        self.token.cancelled().await;
        self.cause.lock().clone().unwrap_or(TrackEnd::Stopped)
    }
}
