use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::{
    events::TeardownReason,
    player::{PlayerSnapshot, PlayerState},
    service::Enqueued,
    track::TrackInfo,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Jukebox Bot";

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &TrackInfo) -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title))
        .color(colors::MUSIC_PURPLE)
        .field("⏱️ Duración", duration_field(track.duration), true)
        .field("👤 Solicitado por", format!("<@{}>", track.requested_by), true)
        .url(&track.source_url)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(enqueued: &Enqueued) -> CreateEmbed {
    let track = &enqueued.info;
    CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!(
            "**{}** se ha agregado a la cola de reproducción",
            track.title
        ))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", duration_field(track.duration), true)
        .field("📍 Posición", enqueued.position.to_string(), true)
        .field("👤 Solicitado por", format!("<@{}>", track.requested_by), true)
        .url(&track.source_url)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente si no hay música sonando",
        ))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(snapshot: &PlayerSnapshot) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if snapshot.current.is_none() && snapshot.queued == 0 {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    // Canción actual
    if let Some(current) = &snapshot.current {
        let status = if snapshot.paused { "⏸️" } else { "▶️" };
        embed = embed.field(
            format!("{} Reproduciendo", status),
            current.to_string(),
            false,
        );
    }

    // Próximas canciones
    if !snapshot.upcoming.is_empty() {
        let description: String = snapshot
            .upcoming
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let duration = item
                    .duration
                    .map(|d| format!(" `[{}]`", format_duration(d)))
                    .unwrap_or_default();
                format!("**{}**. {}{}\n", i + 1, item.title, duration)
            })
            .collect();

        embed = embed.field("Próximas canciones", description, false);
    }

    let state = match snapshot.state {
        PlayerState::Idle => "💤 En espera",
        PlayerState::Playing => "🎶 Reproduciendo",
        PlayerState::Disconnecting => "👋 Desconectando",
    };
    let hidden = snapshot.queued.saturating_sub(snapshot.upcoming.len());
    let mut info = format!("**Estado:** {}\n**En cola:** {} canciones", state, snapshot.queued);
    if hidden > 0 {
        info.push_str(&format!(" • {} más no mostradas", hidden));
    }
    // marca de tiempo relativa de Discord
    info.push_str(&format!(
        "\n**Última actividad:** <t:{}:R>",
        snapshot.last_activity.timestamp()
    ));
    embed = embed.field("Información", info, false);

    embed
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Aviso publicado cuando el bot deja el canal.
pub fn create_disconnected_embed(reason: TeardownReason) -> CreateEmbed {
    let description = match reason {
        TeardownReason::IdleTimeout => "Me desconecté por inactividad. ¡Usa `/play` para volver a llamarme!",
        TeardownReason::Disconnected => "Desconectado a pedido. La cola fue vaciada.",
        TeardownReason::ConnectionLost => "Perdí la conexión de voz. La cola fue vaciada.",
        TeardownReason::Shutdown => "El bot se está apagando.",
    };

    CreateEmbed::default()
        .title("👋 Desconectado")
        .description(description)
        .color(colors::WARNING_ORANGE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de información
pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn duration_field(duration: Option<Duration>) -> String {
    duration
        .map(format_duration)
        .unwrap_or_else(|| "🔴 En vivo".to_string())
}

/// Formatea una duración en formato legible
fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn formats_durations_like_a_player_clock() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(213)), "3:33");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn queue_embed_shows_state_and_last_activity() {
        let snapshot = PlayerSnapshot {
            state: PlayerState::Playing,
            current: Some(TrackInfo::new(
                "Around the World",
                "https://example.com/atw",
                serenity::model::id::UserId::new(7),
            )),
            paused: false,
            upcoming: Vec::new(),
            queued: 0,
            last_activity: chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        };

        let rendered = serde_json::to_string(&create_queue_embed(&snapshot)).unwrap();

        assert!(rendered.contains("Around the World"));
        assert!(rendered.contains("🎶 Reproduciendo"));
        assert!(rendered.contains("<t:1700000000:R>"));
    }

    #[test]
    fn missing_duration_reads_as_live() {
        assert_eq!(duration_field(None), "🔴 En vivo");
        assert_eq!(duration_field(Some(Duration::from_secs(61))), "1:01");
    }
}
