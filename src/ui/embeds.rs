use serenity::all::Timestamp;
use serenity::builder::{CreateEmbed, CreateEmbedFooter};

use crate::subsonic::{Album, Playlist, PlaylistSummary, Song};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Subsonica";

/// Presupuesto de caracteres de la descripción de la cola. Discord corta
/// descripciones más largas, así que el formateador trunca antes.
pub const QUEUE_DESCRIPTION_BUDGET: usize = 4000;

/// Duración en `mm:ss`, o `h:mm:ss` a partir de la hora.
pub fn format_duration(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// Representación textual de la cola, acotada al presupuesto.
///
/// Lista numerada en orden de consumo, con la canción actual al frente.
/// Si no entra completa, se corta en la última línea que cabe y se cierra
/// con cuántas quedaron fuera.
pub fn format_queue(current: Option<&Song>, queue: &[Song]) -> String {
    if current.is_none() && queue.is_empty() {
        return "Queue is empty!".to_string();
    }

    let mut out = String::new();
    if let Some(song) = current {
        out.push_str(&format!("▶️ **{}** - {}\n\n", song.title, song.artist));
    }

    for (idx, song) in queue.iter().enumerate() {
        let line = format!(
            "{}. **{}** - {} [{}]\n",
            idx + 1,
            song.title,
            song.artist,
            song.duration_printable()
        );
        let omitted = queue.len() - idx;
        let sentinel = format!("\nAnd {omitted} more...");
        if out.len() + line.len() + sentinel.len() > QUEUE_DESCRIPTION_BUDGET {
            out.push_str(&sentinel);
            return out;
        }
        out.push_str(&line);
    }

    out
}

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(song: &Song, cover_url: Option<String>) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", song.title))
        .color(colors::SUCCESS_GREEN)
        .field("🎤 Artista", &song.artist, true)
        .field("💿 Álbum", &song.album, true)
        .field("⏱️ Duración", song.duration_printable(), true);

    if let Some(url) = cover_url {
        embed = embed.thumbnail(url);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(song: &Song) -> CreateEmbed {
    CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!(
            "**{}** se ha agregado a la cola de reproducción",
            song.title
        ))
        .color(colors::SUCCESS_GREEN)
        .field("🎤 Artista", &song.artist, true)
        .field("⏱️ Duración", song.duration_printable(), true)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó un álbum completo
pub fn create_album_added_embed(album: &Album) -> CreateEmbed {
    CreateEmbed::default()
        .title("✅ Álbum Agregado")
        .description(format!(
            "**{}** de **{}** se ha agregado a la cola",
            album.name, album.artist
        ))
        .color(colors::SUCCESS_GREEN)
        .field("🎶 Canciones", album.songs.len().to_string(), true)
        .field("⏱️ Duración", format_duration(album.duration), true)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una playlist
pub fn create_playlist_added_embed(playlist: &Playlist) -> CreateEmbed {
    CreateEmbed::default()
        .title("✅ Playlist Agregada")
        .description(format!("**{}** se ha agregado a la cola", playlist.name))
        .color(colors::SUCCESS_GREEN)
        .field("🎶 Canciones", playlist.songs.len().to_string(), true)
        .field("⏱️ Duración", format_duration(playlist.duration), true)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se encoló una discografía completa
pub fn create_discography_added_embed(artist: &str, albums: usize, songs: usize) -> CreateEmbed {
    CreateEmbed::default()
        .title("✅ Discografía Agregada")
        .description(format!(
            "Los {albums} álbumes de **{artist}** se han agregado a la cola"
        ))
        .color(colors::MUSIC_PURPLE)
        .field("🎶 Canciones", songs.to_string(), true)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed con las playlists disponibles en el servidor
pub fn create_playlists_embed(playlists: &[PlaylistSummary]) -> CreateEmbed {
    let description = if playlists.is_empty() {
        "No hay playlists en el servidor.".to_string()
    } else {
        playlists
            .iter()
            .map(|p| {
                format!(
                    "• **{}** — {} canciones [{}]",
                    p.name,
                    p.song_count,
                    format_duration(p.duration)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    CreateEmbed::default()
        .title("📚 Playlists")
        .description(description)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed con el estado actual de la cola
pub fn create_queue_embed(current: Option<&Song>, queue: &[Song]) -> CreateEmbed {
    CreateEmbed::default()
        .title("🎶 Cola de Reproducción")
        .description(format_queue(current, queue))
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed informativo genérico
pub fn create_info_embed(title: &str, message: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(title.to_string())
        .description(message.to_string())
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de advertencia
pub fn create_warning_embed(message: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("⚠️ Atención")
        .description(message.to_string())
        .color(colors::WARNING_ORANGE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de error
pub fn create_error_embed(message: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ Error")
        .description(message.to_string())
        .color(colors::ERROR_RED)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}
