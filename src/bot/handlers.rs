use std::sync::Arc;

use anyhow::Result;
use serenity::{
    all::{CommandInteraction, ResolvedValue},
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::id::{ChannelId, GuildId, UserId},
    prelude::Context,
};
use tracing::{error, info};

use crate::audio::autoplay::AutoplayMode;
use crate::audio::player::Player;
use crate::audio::registry::PlayerRegistry;
use crate::subsonic::{ApiError, Catalog, Playlist};
use crate::ui::embeds;
use crate::ui::sink::ChannelSink;

const NOT_IN_GUILD: &str = "Este comando sólo funciona dentro de un servidor.";
const NOT_IN_VOICE: &str = "Debes estar en un canal de voz para usar este comando.";
const VOICE_CONNECT_FAILED: &str = "No se pudo conectar al canal de voz.";
const CATALOG_ERROR: &str = "El servidor de música devolvió un error.";

/// Despacha una interacción de slash command al handler que corresponde.
pub async fn handle_command(
    ctx: &Context,
    command: &CommandInteraction,
    registry: &Arc<PlayerRegistry>,
    catalog: &Arc<dyn Catalog>,
) -> Result<()> {
    info!("📥 Comando /{} de {}", command.data.name, command.user.name);

    let Some(guild_id) = command.guild_id else {
        return respond_embed(ctx, command, embeds::create_error_embed(NOT_IN_GUILD)).await;
    };

    match command.data.name.as_str() {
        "play" => handle_play(ctx, command, registry, catalog, guild_id).await,
        "skip" => handle_skip(ctx, command, registry, guild_id).await,
        "stop" => handle_stop(ctx, command, registry, guild_id).await,
        "queue" => handle_queue(ctx, command, registry, guild_id).await,
        "clear" => handle_clear(ctx, command, registry, guild_id).await,
        "shuffle" => handle_shuffle(ctx, command, registry, guild_id).await,
        "autoplay" => handle_autoplay(ctx, command, registry, guild_id).await,
        "disco" => handle_disco(ctx, command, registry, catalog, guild_id).await,
        "playlists" => handle_playlists(ctx, command, catalog).await,
        other => {
            respond_embed(
                ctx,
                command,
                embeds::create_error_embed(&format!("Comando desconocido: /{other}")),
            )
            .await
        }
    }
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    registry: &Arc<PlayerRegistry>,
    catalog: &Arc<dyn Catalog>,
    guild_id: GuildId,
) -> Result<()> {
    let query_type = option_str(command, "querytype").unwrap_or("track").to_string();
    let Some(query) = option_str(command, "query").map(str::to_string) else {
        return respond_embed(
            ctx,
            command,
            embeds::create_error_embed("Falta el término de búsqueda."),
        )
        .await;
    };

    // la búsqueda y la conexión pueden tardar más que la ventana de
    // respuesta de Discord
    command.defer(&ctx.http).await?;

    let Some(player) = ensure_voice(ctx, command, registry, catalog, guild_id).await? else {
        return Ok(());
    };

    let embed = match query_type.as_str() {
        "album" => match catalog.search_album(&query).await {
            Ok(Some(album)) => {
                let embed = embeds::create_album_added_embed(&album);
                player.enqueue_many(album.songs);
                embed
            }
            Ok(None) => embeds::create_warning_embed(&format!(
                "No se encontró ningún álbum para «{query}»."
            )),
            Err(err) => {
                error!("❌ Error buscando álbum «{query}»: {err}");
                embeds::create_error_embed(CATALOG_ERROR)
            }
        },
        "playlist" => match find_playlist(catalog, &query).await {
            Ok(Some(playlist)) => {
                let embed = embeds::create_playlist_added_embed(&playlist);
                player.enqueue_many(playlist.songs);
                embed
            }
            Ok(None) => embeds::create_warning_embed(&format!(
                "No se encontró ninguna playlist llamada «{query}»."
            )),
            Err(err) => {
                error!("❌ Error buscando playlist «{query}»: {err}");
                embeds::create_error_embed(CATALOG_ERROR)
            }
        },
        _ => match catalog.search_song(&query).await {
            Ok(Some(song)) => {
                let embed = embeds::create_track_added_embed(&song);
                player.enqueue(song);
                embed
            }
            Ok(None) => embeds::create_warning_embed(&format!(
                "No se encontró ninguna canción para «{query}»."
            )),
            Err(err) => {
                error!("❌ Error buscando canción «{query}»: {err}");
                embeds::create_error_embed(CATALOG_ERROR)
            }
        },
    };

    player.trigger_advance();
    edit_embed(ctx, command, embed).await
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    registry: &Arc<PlayerRegistry>,
    guild_id: GuildId,
) -> Result<()> {
    let skipped = match registry.get(guild_id) {
        Some(player) => player.skip().await,
        None => false,
    };

    let embed = if skipped {
        embeds::create_info_embed("⏭️ Canción Saltada", "Pasando a la siguiente de la cola.")
    } else {
        embeds::create_warning_embed("No hay nada reproduciéndose.")
    };
    respond_embed(ctx, command, embed).await
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    registry: &Arc<PlayerRegistry>,
    guild_id: GuildId,
) -> Result<()> {
    let embed = match registry.get(guild_id) {
        Some(player) => {
            player.stop().await;
            embeds::create_info_embed(
                "⏹️ Reproducción Detenida",
                "La cola se conserva; usa /play para seguir.",
            )
        }
        None => embeds::create_warning_embed("No hay nada reproduciéndose."),
    };
    respond_embed(ctx, command, embed).await
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    registry: &Arc<PlayerRegistry>,
    guild_id: GuildId,
) -> Result<()> {
    let embed = match registry.get(guild_id) {
        Some(player) => {
            let (current, queue) = player.playback_snapshot();
            embeds::create_queue_embed(current.as_ref(), &queue)
        }
        None => embeds::create_queue_embed(None, &[]),
    };
    respond_embed(ctx, command, embed).await
}

async fn handle_clear(
    ctx: &Context,
    command: &CommandInteraction,
    registry: &Arc<PlayerRegistry>,
    guild_id: GuildId,
) -> Result<()> {
    if let Some(player) = registry.get(guild_id) {
        player.clear_queue();
    }
    respond_embed(
        ctx,
        command,
        embeds::create_info_embed("🗑️ Cola Limpiada", "Se quitaron todas las canciones."),
    )
    .await
}

async fn handle_shuffle(
    ctx: &Context,
    command: &CommandInteraction,
    registry: &Arc<PlayerRegistry>,
    guild_id: GuildId,
) -> Result<()> {
    let embed = match registry.get(guild_id) {
        Some(player) if !player.queue_is_empty() => {
            player.shuffle_queue();
            embeds::create_info_embed("🔀 Cola Mezclada", "El orden de la cola es nuevo.")
        }
        _ => embeds::create_warning_embed("La cola está vacía, no hay nada que mezclar."),
    };
    respond_embed(ctx, command, embed).await
}

async fn handle_autoplay(
    ctx: &Context,
    command: &CommandInteraction,
    registry: &Arc<PlayerRegistry>,
    guild_id: GuildId,
) -> Result<()> {
    let Some(mode) = option_str(command, "mode").and_then(AutoplayMode::from_option) else {
        return respond_embed(
            ctx,
            command,
            embeds::create_error_embed("Modo de autoplay desconocido."),
        )
        .await;
    };

    let player = registry.get_or_create(guild_id);
    player.set_autoplay_mode(mode);

    let description = match mode {
        AutoplayMode::None => "La reproducción terminará cuando la cola se vacíe.",
        AutoplayMode::Random => "Canciones aleatorias cuando la cola se vacíe.",
        AutoplayMode::Similar => "Canciones similares a la última cuando la cola se vacíe.",
    };

    // con la cola ya seca, el nuevo modo arranca solo
    if mode != AutoplayMode::None && player.has_session() && !player.is_streaming().await {
        player.trigger_advance();
    }

    respond_embed(
        ctx,
        command,
        embeds::create_info_embed("🎛️ Autoplay Configurado", description),
    )
    .await
}

async fn handle_disco(
    ctx: &Context,
    command: &CommandInteraction,
    registry: &Arc<PlayerRegistry>,
    catalog: &Arc<dyn Catalog>,
    guild_id: GuildId,
) -> Result<()> {
    let Some(artist) = option_str(command, "artist").map(str::to_string) else {
        return respond_embed(
            ctx,
            command,
            embeds::create_error_embed("Falta el nombre del artista."),
        )
        .await;
    };

    // recorrer la discografía implica una llamada por álbum
    command.defer(&ctx.http).await?;

    let Some(player) = ensure_voice(ctx, command, registry, catalog, guild_id).await? else {
        return Ok(());
    };

    let embed = match catalog.get_artist_discography(&artist).await {
        Ok(albums) if albums.is_empty() => {
            embeds::create_warning_embed(&format!("No se encontró al artista «{artist}»."))
        }
        Ok(albums) => {
            let album_count = albums.len();
            let songs: Vec<_> = albums.into_iter().flat_map(|a| a.songs).collect();
            let song_count = songs.len();
            player.enqueue_many(songs);
            embeds::create_discography_added_embed(&artist, album_count, song_count)
        }
        Err(err) => {
            error!("❌ Error trayendo la discografía de «{artist}»: {err}");
            embeds::create_error_embed(CATALOG_ERROR)
        }
    };

    player.trigger_advance();
    edit_embed(ctx, command, embed).await
}

async fn handle_playlists(
    ctx: &Context,
    command: &CommandInteraction,
    catalog: &Arc<dyn Catalog>,
) -> Result<()> {
    command.defer(&ctx.http).await?;

    let embed = match catalog.list_playlists().await {
        Ok(playlists) => embeds::create_playlists_embed(&playlists),
        Err(err) => {
            error!("❌ Error listando playlists: {err}");
            embeds::create_error_embed(CATALOG_ERROR)
        }
    };
    edit_embed(ctx, command, embed).await
}

/// Busca una playlist por nombre, sin distinguir mayúsculas.
async fn find_playlist(
    catalog: &Arc<dyn Catalog>,
    name: &str,
) -> Result<Option<Playlist>, ApiError> {
    let wanted = name.to_lowercase();
    let summaries = catalog.list_playlists().await?;
    let Some(found) = summaries
        .into_iter()
        .find(|playlist| playlist.name.to_lowercase() == wanted)
    else {
        return Ok(None);
    };
    catalog.get_playlist(&found.id).await
}

/// Garantiza un player con sesión de voz en el canal del usuario.
///
/// Si el usuario no está en voz o la conexión falla, responde el error y
/// devuelve `None`; el llamador simplemente corta ahí. La interacción debe
/// estar ya diferida.
async fn ensure_voice(
    ctx: &Context,
    command: &CommandInteraction,
    registry: &Arc<PlayerRegistry>,
    catalog: &Arc<dyn Catalog>,
    guild_id: GuildId,
) -> Result<Option<Arc<Player>>> {
    let Some(channel_id) = user_voice_channel(ctx, guild_id, command.user.id) else {
        edit_embed(ctx, command, embeds::create_error_embed(NOT_IN_VOICE)).await?;
        return Ok(None);
    };

    let player = registry.get_or_create(guild_id);
    player.set_sink(Arc::new(ChannelSink::new(
        ctx.http.clone(),
        command.channel_id,
        catalog.clone(),
    )));

    if !player.has_session() {
        if let Err(err) = player.connect(channel_id).await {
            error!("❌ Conexión a voz fallida en guild {guild_id}: {err}");
            edit_embed(ctx, command, embeds::create_error_embed(VOICE_CONNECT_FAILED)).await?;
            return Ok(None);
        }
    }

    Ok(Some(player))
}

/// Canal de voz donde está el usuario, según la caché de la guild.
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = ctx.cache.guild(guild_id)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|state| state.channel_id)
}

fn option_str<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options()
        .into_iter()
        .find(|option| option.name == name)
        .and_then(|option| match option.value {
            ResolvedValue::String(s) => Some(s),
            _ => None,
        })
}

async fn respond_embed(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embed),
            ),
        )
        .await?;
    Ok(())
}

async fn edit_embed(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}
