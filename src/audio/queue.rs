use rand::seq::SliceRandom;
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::subsonic::Song;

/// Cola de reproducción de una guild.
///
/// FIFO estricto: el orden de inserción es el orden de consumo. La cola
/// nunca contiene la canción en reproducción; el player la extrae con
/// [`SongQueue::pop_front`] en el instante en que pasa a ser la actual.
#[derive(Debug, Default)]
pub struct SongQueue {
    items: VecDeque<Song>,
}

impl SongQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega una canción al final de la cola.
    pub fn enqueue(&mut self, song: Song) {
        debug!("➕ Agregado a la cola: {}", song.title);
        self.items.push_back(song);
    }

    /// Agrega varias canciones preservando el orden de origen.
    pub fn enqueue_many(&mut self, songs: Vec<Song>) {
        debug!("➕ Agregadas {} canciones a la cola", songs.len());
        self.items.extend(songs);
    }

    /// Extrae la primera canción de la cola.
    pub fn pop_front(&mut self) -> Option<Song> {
        self.items.pop_front()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        info!("🗑️ Cola limpiada");
    }

    /// Mezcla la cola con Fisher–Yates sobre un snapshot.
    ///
    /// La permutación es uniforme y la cola se reemplaza entera de una vez:
    /// ningún lector concurrente puede observar un estado a medio mezclar,
    /// porque toda mutación pasa por el lock del player dueño de la cola.
    pub fn shuffle(&mut self) {
        let mut snapshot: Vec<Song> = self.items.drain(..).collect();
        snapshot.shuffle(&mut rand::thread_rng());
        self.items.extend(snapshot);
        info!("🔀 Cola mezclada ({} canciones)", self.items.len());
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Vista inmutable de la cola, en orden de consumo.
    pub fn snapshot(&self) -> Vec<Song> {
        self.items.iter().cloned().collect()
    }
}
