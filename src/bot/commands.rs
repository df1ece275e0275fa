use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        skip_command(),
        stop_command(),
        queue_command(),
        clear_command(),
        shuffle_command(),
        autoplay_command(),
        disco_command(),
        playlists_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }
    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Busca en el servidor de música y lo agrega a la cola")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "querytype", "Qué buscar")
                .add_string_choice("Canción", "track")
                .add_string_choice("Álbum", "album")
                .add_string_choice("Playlist", "playlist")
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "Término de búsqueda")
                .required(true),
        )
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta a la siguiente canción")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción (la cola se conserva)")
}

// Comandos de cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Muestra la cola de reproducción")
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Limpia la cola de reproducción")
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Mezcla la cola de reproducción")
}

fn autoplay_command() -> CreateCommand {
    CreateCommand::new("autoplay")
        .description("Configura qué reproducir cuando la cola se vacía")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mode", "Modo de autoplay")
                .add_string_choice("Apagado", "none")
                .add_string_choice("Aleatorio", "random")
                .add_string_choice("Similar", "similar")
                .required(true),
        )
}

// Comandos de catálogo

fn disco_command() -> CreateCommand {
    CreateCommand::new("disco")
        .description("Encola la discografía completa de un artista")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "artist", "Nombre del artista")
                .required(true),
        )
}

fn playlists_command() -> CreateCommand {
    CreateCommand::new("playlists").description("Lista las playlists del servidor de música")
}
