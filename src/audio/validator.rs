use crate::{
    audio::track::TrackMetadata,
    error::{MusicError, MusicResult},
};

pub const DEFAULT_MAX_DURATION_SECS: u64 = 600;
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 20_000_000;

/// Duration and size limits a track must satisfy before it is queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackPolicy {
    pub max_duration_secs: u64,
    pub max_size_bytes: u64,
}

impl Default for TrackPolicy {
    fn default() -> Self {
        Self {
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
        }
    }
}

impl TrackPolicy {
    #[cfg(test)]
    pub fn is_valid(&self, metadata: &TrackMetadata) -> bool {
        self.check(metadata).is_ok()
    }

    /// Rejects metadata over either limit, naming the violated one.
    pub fn check(&self, metadata: &TrackMetadata) -> MusicResult<()> {
        if metadata.duration_secs > self.max_duration_secs {
            return Err(MusicError::TrackTooLong {
                duration: metadata.duration_secs,
                limit: self.max_duration_secs,
            });
        }
        self.check_size(metadata.estimated_size)
    }

    pub fn check_size(&self, size: u64) -> MusicResult<()> {
        if size > self.max_size_bytes {
            return Err(MusicError::TrackTooLarge {
                size,
                limit: self.max_size_bytes,
            });
        }
        Ok(())
    }
}
