use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::{Album, ApiError, Catalog, Playlist, PlaylistSummary, Song};

/// Versión del protocolo Subsonic que hablamos.
const API_VERSION: &str = "1.16.1";
/// Identificador de cliente que se reporta al servidor.
const CLIENT_NAME: &str = "subsonica";

/// Cliente REST para un servidor Subsonic.
///
/// Autenticación con los parámetros `u`/`p` clásicos; todas las respuestas
/// se piden en JSON (`f=json`) y llegan dentro del sobre
/// `subsonic-response`.
pub struct SubsonicClient {
    http: reqwest::Client,
    base: Url,
    user: String,
    password: String,
}

impl SubsonicClient {
    pub fn new(base_url: &str, user: &str, password: &str) -> Result<Self, ApiError> {
        // Url::join descarta el último segmento si la base no termina en '/'
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base = Url::parse(&normalized)
            .map_err(|e| ApiError::Malformed(format!("invalid Subsonic URL: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            http,
            base,
            user: user.to_string(),
            password: password.to_string(),
        })
    }

    /// Construye la URL de una vista REST con los parámetros comunes.
    fn endpoint(&self, view: &str, params: &[(&str, &str)]) -> Result<Url, ApiError> {
        let mut url = self
            .base
            .join(&format!("rest/{view}"))
            .map_err(|e| ApiError::Malformed(format!("invalid endpoint {view}: {e}")))?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("u", &self.user)
                .append_pair("p", &self.password)
                .append_pair("v", API_VERSION)
                .append_pair("c", CLIENT_NAME)
                .append_pair("f", "json");
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }

        Ok(url)
    }

    /// Ejecuta una vista REST y desenvuelve el sobre `subsonic-response`.
    async fn request(&self, view: &str, params: &[(&str, &str)]) -> Result<ResponseBody, ApiError> {
        let url = self.endpoint(view, params)?;
        debug!("consultando Subsonic: {view}");

        let envelope: Envelope = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let body = envelope.response;
        if body.status != "ok" {
            let err = body.error.unwrap_or(WireError {
                code: 0,
                message: "unknown server error".into(),
            });
            warn!("⚠️ Subsonic devolvió error {} en {view}: {}", err.code, err.message);
            return Err(ApiError::Api {
                code: err.code,
                message: err.message,
            });
        }

        Ok(body)
    }

    /// Canciones completas de un álbum (la búsqueda sólo devuelve metadatos).
    async fn fetch_album(&self, album_id: &str) -> Result<Option<Album>, ApiError> {
        let body = self.request("getAlbum", &[("id", album_id)]).await?;
        Ok(body.album)
    }
}

#[async_trait]
impl Catalog for SubsonicClient {
    async fn search_song(&self, query: &str) -> Result<Option<Song>, ApiError> {
        let body = self
            .request(
                "search3",
                &[
                    ("query", query),
                    ("songCount", "1"),
                    ("albumCount", "0"),
                    ("artistCount", "0"),
                ],
            )
            .await?;
        let result = body
            .search_result3
            .ok_or_else(|| ApiError::Malformed("search3 without searchResult3".into()))?;
        Ok(result.song.into_iter().next())
    }

    async fn search_album(&self, name: &str) -> Result<Option<Album>, ApiError> {
        let body = self
            .request(
                "search3",
                &[
                    ("query", name),
                    ("songCount", "0"),
                    ("albumCount", "1"),
                    ("artistCount", "0"),
                ],
            )
            .await?;
        let result = body
            .search_result3
            .ok_or_else(|| ApiError::Malformed("search3 without searchResult3".into()))?;

        match result.album.into_iter().next() {
            Some(album) => self.fetch_album(&album.id).await,
            None => Ok(None),
        }
    }

    async fn list_playlists(&self) -> Result<Vec<PlaylistSummary>, ApiError> {
        let body = self.request("getPlaylists", &[]).await?;
        Ok(body.playlists.map(|p| p.playlist).unwrap_or_default())
    }

    async fn get_playlist(&self, id: &str) -> Result<Option<Playlist>, ApiError> {
        let body = self.request("getPlaylist", &[("id", id)]).await?;
        Ok(body.playlist)
    }

    async fn get_artist_discography(&self, artist: &str) -> Result<Vec<Album>, ApiError> {
        // getArtists indexa por inicial; buscamos el nombre exacto sin
        // distinguir mayúsculas
        let body = self.request("getArtists", &[]).await?;
        let indexes = body
            .artists
            .map(|a| a.index)
            .unwrap_or_default();
        let wanted = artist.to_lowercase();
        let Some(found) = indexes
            .into_iter()
            .flat_map(|idx| idx.artist)
            .find(|a| a.name.to_lowercase() == wanted)
        else {
            return Ok(Vec::new());
        };

        let body = self.request("getArtist", &[("id", &found.id)]).await?;
        let albums = body.artist.map(|a| a.album).unwrap_or_default();

        let mut discography = Vec::with_capacity(albums.len());
        for album in albums {
            if let Some(full) = self.fetch_album(&album.id).await? {
                discography.push(full);
            }
        }
        Ok(discography)
    }

    async fn get_random_songs(&self, count: usize) -> Result<Vec<Song>, ApiError> {
        let size = count.to_string();
        let body = self.request("getRandomSongs", &[("size", &size)]).await?;
        Ok(body.random_songs.map(|s| s.song).unwrap_or_default())
    }

    async fn get_similar_songs(&self, song_id: &str, count: usize) -> Result<Vec<Song>, ApiError> {
        let size = count.to_string();
        let body = self
            .request("getSimilarSongs", &[("id", song_id), ("count", &size)])
            .await?;
        Ok(body.similar_songs.map(|s| s.song).unwrap_or_default())
    }

    async fn resolve_stream_url(&self, song_id: &str) -> Result<String, ApiError> {
        // La URL se entrega tal cual al driver de voz, que abre el stream
        let url = self.endpoint("stream", &[("id", song_id)])?;
        Ok(url.to_string())
    }

    fn cover_art_url(&self, cover_id: &str) -> Option<String> {
        self.endpoint("getCoverArt", &[("id", cover_id)])
            .ok()
            .map(|u| u.to_string())
    }
}

// ───── Estructuras de deserialización del sobre REST ─────

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "subsonic-response")]
    response: ResponseBody,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseBody {
    status: String,
    error: Option<WireError>,
    search_result3: Option<SearchResult3>,
    random_songs: Option<SongList>,
    similar_songs: Option<SongList>,
    playlists: Option<PlaylistsWire>,
    playlist: Option<Playlist>,
    artists: Option<ArtistsWire>,
    artist: Option<ArtistWire>,
    album: Option<Album>,
}

#[derive(Deserialize)]
struct WireError {
    code: u32,
    message: String,
}

#[derive(Deserialize, Default)]
struct SearchResult3 {
    #[serde(default)]
    song: Vec<Song>,
    #[serde(default)]
    album: Vec<AlbumRef>,
}

#[derive(Deserialize)]
struct AlbumRef {
    id: String,
}

#[derive(Deserialize)]
struct SongList {
    #[serde(default)]
    song: Vec<Song>,
}

#[derive(Deserialize)]
struct PlaylistsWire {
    #[serde(default)]
    playlist: Vec<PlaylistSummary>,
}

#[derive(Deserialize)]
struct ArtistsWire {
    #[serde(default)]
    index: Vec<ArtistIndex>,
}

#[derive(Deserialize)]
struct ArtistIndex {
    #[serde(default)]
    artist: Vec<ArtistRef>,
}

#[derive(Deserialize)]
struct ArtistRef {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct ArtistWire {
    #[serde(default)]
    album: Vec<AlbumRef>,
}
