use tracing::{debug, info};

use crate::subsonic::{ApiError, Catalog, Song};

/// Modo de autoplay de una guild. Independiente del contenido de la cola.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoplayMode {
    #[default]
    None,
    Random,
    Similar,
}

impl AutoplayMode {
    /// Interpreta el valor de la opción del comando `/autoplay`.
    pub fn from_option(value: &str) -> Option<Self> {
        match value {
            "none" => Some(AutoplayMode::None),
            "random" => Some(AutoplayMode::Random),
            "similar" => Some(AutoplayMode::Similar),
            _ => None,
        }
    }
}

/// Selecciona 0 o 1 canciones para sostener la reproducción.
///
/// Se invoca únicamente con la cola vacía. Sin canción previa no hay de
/// dónde derivar similitud, así que el modo efectivo cae a `Random` sea
/// cual sea el configurado. Un resultado vacío no es un error: significa
/// que el catálogo no tiene candidatos y el llamador no debe insistir.
/// Los errores del catálogo se propagan sin tocar.
pub async fn select_autoplay(
    catalog: &dyn Catalog,
    mode: AutoplayMode,
    previous_song_id: Option<&str>,
) -> Result<Vec<Song>, ApiError> {
    if mode == AutoplayMode::None {
        return Ok(Vec::new());
    }

    let effective = if previous_song_id.is_none() {
        info!("sin canción previa para autoplay, usando modo aleatorio");
        AutoplayMode::Random
    } else {
        mode
    };

    match (effective, previous_song_id) {
        (AutoplayMode::Similar, Some(prev_id)) => {
            debug!("autoplay por similitud con {prev_id}");
            catalog.get_similar_songs(prev_id, 1).await
        }
        _ => catalog.get_random_songs(1).await,
    }
}
