use std::collections::VecDeque;
use tracing::{debug, info};

use super::track::{Track, TrackInfo};

/// Cola FIFO de un servidor. Sin límite de tamaño, sin shuffle ni prioridades:
/// las pistas salen exactamente en el orden en que entraron.
#[derive(Debug, Default)]
pub struct TrackQueue {
    items: VecDeque<Track>,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega un track al final y devuelve su posición (1 = siguiente).
    pub fn push(&mut self, track: Track) -> usize {
        info!("➕ Agregado a la cola: {}", track.info().title);
        self.items.push_back(track);
        self.items.len()
    }

    /// Obtiene el siguiente track (FIFO - First In, First Out)
    pub fn pop(&mut self) -> Option<Track> {
        let next = self.items.pop_front();
        if let Some(ref track) = next {
            debug!("➡️ Siguiente en cola (FIFO): {}", track.info().title);
        }
        next
    }

    /// Copia la metadata de los primeros `limit` tracks sin tocar la cola.
    pub fn peek(&self, limit: usize) -> Vec<TrackInfo> {
        self.items
            .iter()
            .take(limit)
            .map(|track| track.info().clone())
            .collect()
    }

    /// Vacía la cola y entrega los tracks para que el llamador los libere.
    pub fn drain(&mut self) -> Vec<Track> {
        let drained: Vec<_> = self.items.drain(..).collect();
        if !drained.is_empty() {
            info!("🗑️ Cola limpiada ({} canciones)", drained.len());
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
