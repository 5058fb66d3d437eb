use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use super::{events::ChannelNotifier, MusicBot};
use crate::{
    audio::service::EnqueueRequest,
    error::{PlayerError, ResolutionError},
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &MusicBot) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return respond(
            ctx,
            &command,
            embeds::create_error_embed("Solo en servidores", "Este comando solo funciona en un servidor"),
            true,
        )
        .await;
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await,
        "pause" => handle_pause(ctx, &command, bot, guild_id).await,
        "resume" => handle_resume(ctx, &command, bot, guild_id).await,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await,
        "disconnect" => handle_disconnect(ctx, &command, bot, guild_id).await,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await,
        _ => {
            respond(
                ctx,
                &command,
                embeds::create_error_embed("Comando desconocido", "❌ Comando no reconocido"),
                true,
            )
            .await
        }
    }
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;

    // Defer la respuesta ya que yt-dlp puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let request = EnqueueRequest {
        guild_id,
        voice_channel: user_voice_channel(ctx, guild_id, command.user.id),
        query,
        requested_by: command.user.id,
    };
    let notifier = ChannelNotifier::new(ctx.http.clone(), command.channel_id);

    let embed = match bot.service.enqueue(request, notifier).await {
        Ok(enqueued) => embeds::create_track_added_embed(&enqueued),
        Err(e) => {
            warn!("❌ /play falló en guild {}: {}", guild_id, e);
            error_embed(&e)
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_pause(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let embed = match bot.service.pause(guild_id).await {
        Ok(true) => embeds::create_success_embed("Pausado", "⏸️ Reproducción pausada"),
        Ok(false) => embeds::create_info_embed("Nada que pausar", "No hay una canción sonando"),
        Err(e) => error_embed(&e),
    };
    respond(ctx, command, embed, false).await
}

async fn handle_resume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let embed = match bot.service.resume(guild_id).await {
        Ok(true) => embeds::create_success_embed("Reanudado", "▶️ Reproducción reanudada"),
        Ok(false) => embeds::create_info_embed("Nada que reanudar", "La reproducción no está pausada"),
        Err(e) => error_embed(&e),
    };
    respond(ctx, command, embed, false).await
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let embed = match bot.service.skip(guild_id) {
        Ok(true) => embeds::create_success_embed("Saltada", "⏭️ Pasando a la siguiente canción"),
        Ok(false) => embeds::create_info_embed("Nada que saltar", "No hay una canción sonando"),
        Err(e) => error_embed(&e),
    };
    respond(ctx, command, embed, false).await
}

async fn handle_disconnect(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    // la limpieza puede tardar hasta SHUTDOWN_GRACE
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let embed = match bot.service.disconnect(guild_id).await {
        Ok(()) => embeds::create_success_embed("Desconectado", "👋 Cola vaciada y canal abandonado"),
        Err(e) => error_embed(&e),
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let embed = match bot.service.status(guild_id) {
        Some(snapshot) => embeds::create_queue_embed(&snapshot),
        None => error_embed(&PlayerError::NoActivePlayer),
    };
    respond(ctx, command, embed, false).await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.service.status(guild_id).and_then(|snapshot| snapshot.current) {
        Some(current) => respond(ctx, command, embeds::create_now_playing_embed(&current), false).await,
        None => {
            respond(
                ctx,
                command,
                embeds::create_info_embed("Silencio", "❌ No hay nada reproduciéndose actualmente"),
                true,
            )
            .await
        }
    }
}

// Funciones auxiliares

async fn respond(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;

    Ok(())
}

/// Canal de voz actual del usuario según la caché de la guild.
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

fn error_embed(error: &PlayerError) -> CreateEmbed {
    let title = match error {
        PlayerError::NoVoiceChannel => "Sin canal de voz",
        PlayerError::Resolution(ResolutionError::NoResults(_)) => "Sin resultados",
        PlayerError::Resolution(ResolutionError::Disallowed(_)) => "No permitido",
        PlayerError::Resolution(_) => "Error de búsqueda",
        PlayerError::PlayerGone => "Reproductor cerrándose",
        PlayerError::VoiceConnection(_) => "Error de conexión",
        PlayerError::NoActivePlayer => "Sin reproductor",
    };
    embeds::create_error_embed(title, &error.to_string())
}
