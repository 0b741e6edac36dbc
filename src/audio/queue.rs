use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use crate::{
    audio::track::{Track, TrackInfo},
    error::{MusicError, MusicResult},
};

pub const DEFAULT_QUEUE_CAPACITY: usize = 10;
pub const DEFAULT_VOLUME: u8 = 100;

/// Per-guild track queue.
///
/// The front of the queue is the track currently playing; there is no
/// separate "current" slot.
#[derive(Debug)]
pub struct GuildQueue {
    tracks: VecDeque<Track>,
    capacity: usize,
    loop_enabled: bool,
    volume: u8,
    download_in_flight: bool,
    generation: u64,
}

impl Default for GuildQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY, DEFAULT_VOLUME)
    }
}

impl GuildQueue {
    pub fn new(capacity: usize, volume: u8) -> Self {
        Self {
            tracks: VecDeque::with_capacity(capacity),
            capacity,
            loop_enabled: false,
            volume: volume.min(100),
            download_in_flight: false,
            generation: 0,
        }
    }

    /// Agrega un track al final de la cola
    pub fn enqueue(&mut self, track: Track) -> MusicResult<usize> {
        if self.tracks.len() >= self.capacity {
            return Err(MusicError::QueueFull(self.capacity));
        }

        info!("➕ Agregado a la cola: {}", track.title());
        self.tracks.push_back(track);
        Ok(self.tracks.len() - 1)
    }

    pub fn peek_current(&self) -> Option<&Track> {
        self.tracks.front()
    }

    /// Moves past the current track once it has finished.
    ///
    /// With loop enabled the current track stays at the front and is returned
    /// again; its audio is replayed from offset 0 on the next play.
    pub fn advance(&mut self) -> Option<&Track> {
        if self.loop_enabled {
            if let Some(current) = self.tracks.front() {
                info!("🔂 Repitiendo track: {}", current.title());
            }
            return self.tracks.front();
        }
        self.skip()
    }

    /// Pops the current track regardless of the loop flag.
    pub fn skip(&mut self) -> Option<&Track> {
        if let Some(finished) = self.tracks.pop_front() {
            debug!("⏭️ Track retirado de la cola: {}", finished.title());
        }

        match self.tracks.front() {
            Some(next) => {
                info!("➡️ Siguiente en cola (FIFO): {}", next.title());
                Some(next)
            }
            None => {
                info!("📭 Cola vacía, no hay siguiente track");
                None
            }
        }
    }

    /// Empties the queue and turns loop off.
    ///
    /// Bumps the generation so downloads started before the clear can tell
    /// their result is no longer wanted.
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.loop_enabled = false;
        self.generation = self.generation.wrapping_add(1);
        info!("🗑️ Cola limpiada");
    }

    pub fn set_volume(&mut self, percent: u8) {
        self.volume = percent.min(100);
    }

    pub fn toggle_loop(&mut self) -> bool {
        self.loop_enabled = !self.loop_enabled;
        if self.loop_enabled {
            info!("🔂 Repetir canción activado");
        } else {
            info!("➡️ Repetición desactivada");
        }
        self.loop_enabled
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Volume as the gain factor the voice transport expects.
    pub fn volume_fraction(&self) -> f32 {
        f32::from(self.volume) / 100.0
    }

    pub fn is_loop(&self) -> bool {
        self.loop_enabled
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn download_in_flight(&self) -> bool {
        self.download_in_flight
    }

    pub fn set_download_in_flight(&mut self, in_flight: bool) {
        self.download_in_flight = in_flight;
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let mut tracks = self.tracks.iter().map(Track::info);
        let current = tracks.next();
        QueueSnapshot {
            current,
            upcoming: tracks.collect(),
            loop_enabled: self.loop_enabled,
            volume: self.volume,
            capacity: self.capacity,
        }
    }
}

/// Display copy of a guild queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub current: Option<TrackInfo>,
    pub upcoming: Vec<TrackInfo>,
    pub loop_enabled: bool,
    pub volume: u8,
    pub capacity: usize,
}

impl QueueSnapshot {
    pub fn len(&self) -> usize {
        self.upcoming.len() + usize::from(self.current.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    pub fn total_duration(&self) -> Duration {
        self.current
            .iter()
            .chain(self.upcoming.iter())
            .map(|track| track.duration)
            .sum()
    }
}
