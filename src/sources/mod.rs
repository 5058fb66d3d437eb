pub mod ytdlp;

use async_trait::async_trait;
use serenity::model::id::UserId;

use crate::{audio::track::Track, error::ResolutionError};

pub use ytdlp::YtDlpResolver;

/// Convierte una búsqueda o URL en un [`Track`] reproducible.
///
/// Implementations must be safe to call concurrently from many guilds.
/// The playback core never retries a failed resolution.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Track, ResolutionError>;
}
