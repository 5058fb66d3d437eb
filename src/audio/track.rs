use serenity::model::id::UserId;
use songbird::input::Input;
use std::{fmt, time::Duration};
use tracing::debug;

use crate::error::VoiceConnectionError;

/// Metadata de una pista resuelta. Es lo único que se clona hacia fuera del
/// reproductor (snapshots, eventos); el stream nunca sale de su [`Track`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub title: String,
    pub source_url: String,
    pub requested_by: UserId,
    pub duration: Option<Duration>,
}

impl TrackInfo {
    pub fn new(title: impl Into<String>, source_url: impl Into<String>, requested_by: UserId) -> Self {
        Self {
            title: title.into(),
            source_url: source_url.into(),
            requested_by,
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

impl fmt::Display for TrackInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` pedido por <@{}>", self.title, self.requested_by)
    }
}

/// Recurso de audio detrás de una pista (stream HTTP, proceso decodificador...).
pub trait StreamSource: Send + 'static {
    /// Entrega el input reproducible al motor. Solo se llama una vez.
    fn open(&mut self) -> Result<Input, VoiceConnectionError>;

    /// Libera lo que quede abierto. Puede llamarse varias veces.
    fn release(&mut self);
}

/// Exclusive owner of a [`StreamSource`].
///
/// The handle can be opened at most once and is released exactly once,
/// either explicitly by the player loop or on drop, whichever comes first.
pub struct StreamHandle {
    source: Box<dyn StreamSource>,
    opened: bool,
    released: bool,
}

impl StreamHandle {
    pub fn new(source: impl StreamSource) -> Self {
        Self {
            source: Box::new(source),
            opened: false,
            released: false,
        }
    }

    pub fn open(&mut self) -> Result<Input, VoiceConnectionError> {
        if self.released {
            return Err(VoiceConnectionError::Stream("stream ya liberado".into()));
        }
        if self.opened {
            return Err(VoiceConnectionError::Stream("stream ya en uso".into()));
        }
        self.opened = true;
        self.source.open()
    }

    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.source.release();
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("opened", &self.opened)
            .field("released", &self.released)
            .finish()
    }
}

/// Una pista lista para encolar: metadata + stream exclusivo.
#[derive(Debug)]
pub struct Track {
    info: TrackInfo,
    stream: StreamHandle,
}

impl Track {
    pub fn new(info: TrackInfo, source: impl StreamSource) -> Self {
        Self {
            info,
            stream: StreamHandle::new(source),
        }
    }

    pub fn info(&self) -> &TrackInfo {
        &self.info
    }

    pub fn stream_mut(&mut self) -> &mut StreamHandle {
        &mut self.stream
    }

    /// Libera el stream de la pista (idempotente).
    pub fn release(&mut self) {
        if !self.stream.is_released() {
            debug!("🧹 Liberando stream de: {}", self.info.title);
        }
        self.stream.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{user, FakeStream, Journal};
    use pretty_assertions::assert_eq;

    #[test]
    fn release_runs_once_even_when_dropped_afterwards() {
        let journal = Journal::default();
        let mut track = Track::new(
            TrackInfo::new("A", "https://example.com/a", user(1)),
            FakeStream::new("A", &journal),
        );

        track.release();
        track.release();
        drop(track);

        assert_eq!(journal.entries(), vec!["release:A".to_string()]);
    }

    #[test]
    fn dropping_an_unplayed_track_releases_its_stream() {
        let journal = Journal::default();
        let track = Track::new(
            TrackInfo::new("B", "https://example.com/b", user(1)),
            FakeStream::new("B", &journal),
        );

        drop(track);

        assert_eq!(journal.entries(), vec!["release:B".to_string()]);
    }

    #[test]
    fn released_stream_cannot_be_opened() {
        let journal = Journal::default();
        let mut handle = StreamHandle::new(FakeStream::new("C", &journal));
        handle.release();

        assert!(matches!(handle.open(), Err(VoiceConnectionError::Stream(_))));
        assert!(handle.is_released());
    }

    #[test]
    fn display_mentions_requester() {
        let info = TrackInfo::new("Song", "https://example.com/s", user(42));
        assert_eq!(info.to_string(), "`Song` pedido por <@42>");
    }
}
