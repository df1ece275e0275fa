//! # Subsonic Module
//!
//! Value objects and client for a Subsonic-compatible media server.
//!
//! The playback core consumes the server exclusively through the
//! [`Catalog`] trait so it can be exercised against mocks; the real
//! REST client lives in [`client`].

pub mod client;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

pub use client::SubsonicClient;

/// Error tipado de la API de Subsonic.
#[derive(Debug, Error)]
pub enum ApiError {
    /// El servidor respondió con su sobre de error (código + mensaje).
    #[error("Subsonic API error (code {code}): {message}")]
    Api { code: u32, message: String },

    #[error("request to the Subsonic server failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response from the Subsonic server: {0}")]
    Malformed(String),
}

/// Una canción del catálogo. Valor inmutable una vez obtenido.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    /// Duración en segundos.
    #[serde(default)]
    pub duration: u64,
    #[serde(rename = "coverArt")]
    pub cover_id: Option<String>,
}

impl Song {
    /// Duración en formato `mm:ss`.
    pub fn duration_printable(&self) -> String {
        format!("{:02}:{:02}", self.duration / 60, self.duration % 60)
    }
}

/// Un álbum con sus canciones (pobladas por el cliente vía `getAlbum`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub song_count: u32,
    /// Duración total en segundos.
    #[serde(default)]
    pub duration: u64,
    #[serde(rename = "coverArt")]
    pub cover_id: Option<String>,
    #[serde(rename = "song", default)]
    pub songs: Vec<Song>,
}

/// Resumen de una playlist, como lo devuelve `getPlaylists`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub song_count: u32,
    /// Duración total en segundos.
    #[serde(default)]
    pub duration: u64,
}

/// Una playlist completa con sus entradas.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub song_count: u32,
    /// Duración total en segundos.
    #[serde(default)]
    pub duration: u64,
    #[serde(rename = "coverArt")]
    pub cover_id: Option<String>,
    #[serde(rename = "entry", default)]
    pub songs: Vec<Song>,
}

/// Catálogo remoto de música.
///
/// Un resultado vacío (`None` / `Vec` vacío) no es un error: significa que
/// el servidor no encontró candidatos. Los errores de API se propagan sin
/// tocar para que el llamador decida cómo presentarlos.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Busca una única canción que coincida con la consulta.
    async fn search_song(&self, query: &str) -> Result<Option<Song>, ApiError>;

    /// Busca un álbum por nombre, con sus canciones.
    async fn search_album(&self, name: &str) -> Result<Option<Album>, ApiError>;

    async fn list_playlists(&self) -> Result<Vec<PlaylistSummary>, ApiError>;

    async fn get_playlist(&self, id: &str) -> Result<Option<Playlist>, ApiError>;

    /// Discografía completa de un artista, álbum por álbum.
    async fn get_artist_discography(&self, artist: &str) -> Result<Vec<Album>, ApiError>;

    async fn get_random_songs(&self, count: usize) -> Result<Vec<Song>, ApiError>;

    async fn get_similar_songs(&self, song_id: &str, count: usize) -> Result<Vec<Song>, ApiError>;

    /// Resuelve la URL de streaming para una canción.
    async fn resolve_stream_url(&self, song_id: &str) -> Result<String, ApiError>;

    /// URL de la carátula, si el servidor tiene una para este id.
    fn cover_art_url(&self, cover_id: &str) -> Option<String>;
}
