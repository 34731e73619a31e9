use rand::seq::SliceRandom;
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::{
    audio::track::{AudioSource, Track, TrackInfo},
    error::{Result, SessionError},
};

/// Pending tracks of one session, in playback order.
///
/// The queue does no locking of its own: the owning session keeps it behind
/// the same lock as the rest of its state, so every mutation and the pop done
/// by the playback loop are serialized.
#[derive(Debug)]
pub struct TrackQueue<A> {
    items: VecDeque<Track<A>>,
}

impl<A: AudioSource> Default for TrackQueue<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: AudioSource> TrackQueue<A> {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    /// Agrega un track al final de la cola. Devuelve su posición (1-based).
    pub fn enqueue(&mut self, track: Track<A>) -> usize {
        debug!("➕ Agregado a la cola: {}", track.title());
        self.items.push_back(track);
        self.items.len()
    }

    /// Reinserta un track en la cabeza (modo loop)
    pub fn push_front(&mut self, track: Track<A>) {
        debug!("🔂 Reinsertado al frente: {}", track.title());
        self.items.push_front(track);
    }

    /// Obtiene el siguiente track (FIFO)
    pub fn dequeue_front(&mut self) -> Option<Track<A>> {
        self.items.pop_front()
    }

    /// Elimina el track en `index` (0-based) y libera su audio.
    pub fn remove_at(&mut self, index: usize) -> Result<TrackInfo> {
        let len = self.items.len();
        let track = self
            .items
            .remove(index)
            .ok_or(SessionError::IndexOutOfRange { index, len })?;
        let (info, _audio) = track.into_parts();
        debug!("❌ Track eliminado en posición {}: {}", index, info.title);
        Ok(info)
    }

    /// Mezcla la cola
    pub fn shuffle(&mut self) {
        if self.items.len() < 2 {
            return;
        }
        self.items
            .make_contiguous()
            .shuffle(&mut rand::thread_rng());
        info!("🔀 Cola mezclada ({} canciones)", self.items.len());
    }

    /// Limpia la cola; devuelve cuántos tracks se descartaron
    pub fn clear(&mut self) -> usize {
        let cleared = self.items.len();
        self.items.clear();
        if cleared > 0 {
            info!("🗑️ Cola limpiada: {} tracks removidos", cleared);
        }
        cleared
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Copies the metadata of `[start, end)`, clamped to the queue bounds.
    pub fn snapshot_range(&self, start: usize, end: usize) -> Vec<TrackInfo> {
        let end = end.min(self.items.len());
        if start >= end {
            return Vec::new();
        }
        self.items
            .range(start..end)
            .map(|track| track.info().clone())
            .collect()
    }

    /// Obtiene una página específica de la cola
    pub fn page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items_per_page = items_per_page.max(1);
        let total_items = self.items.len();
        let total_pages = total_items.div_ceil(items_per_page).max(1);
        let current_page = page.max(1);
        let start = (current_page - 1).saturating_mul(items_per_page);

        QueuePage {
            items: self.snapshot_range(start, start.saturating_add(items_per_page)),
            current_page,
            total_pages,
            total_items,
            first_position: start.saturating_add(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueuePage {
    pub items: Vec<TrackInfo>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    /// 1-based queue position of `items[0]`
    pub first_position: usize,
}

impl QueuePage {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
