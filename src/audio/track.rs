use bytes::Bytes;
use chrono::{DateTime, Utc};
use songbird::input::{AudioStream, Input, LiveInput};
use std::{fmt, io::Cursor, time::Duration};
use symphonia::core::io::MediaSource;

/// Metadata reported by the resolver before any audio is fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: String,
    pub url: String,
    pub duration_secs: u64,
    pub thumbnail: Option<String>,
    /// Best guess of the audio payload size in bytes, 0 when unknown.
    pub estimated_size: u64,
    /// Direct link to the audio payload chosen by the resolver.
    pub stream_url: Option<String>,
}

impl TrackMetadata {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

/// Downloaded audio held in memory.
///
/// Cloning is cheap (reference counted) and every call to [`AudioData::to_input`]
/// starts reading at offset 0, which is how a looped track is replayed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AudioData(Bytes);

impl AudioData {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Builds a songbird input positioned at the start of the payload.
    pub fn to_input(&self) -> Input {
        let source: Box<dyn MediaSource> = Box::new(Cursor::new(self.0.clone()));
        Input::Live(
            LiveInput::Raw(AudioStream {
                input: source,
                hint: None,
            }),
            None,
        )
    }
}

impl fmt::Debug for AudioData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AudioData({} bytes)", self.0.len())
    }
}

/// A resolved, downloaded track owned by a guild queue.
#[derive(Debug, Clone)]
pub struct Track {
    pub metadata: TrackMetadata,
    pub requested_by: String,
    pub added_at: DateTime<Utc>,
    pub audio: AudioData,
}

impl Track {
    pub fn new(metadata: TrackMetadata, requested_by: impl Into<String>, audio: AudioData) -> Self {
        Self {
            metadata,
            requested_by: requested_by.into(),
            added_at: Utc::now(),
            audio,
        }
    }

    pub fn title(&self) -> &str {
        &self.metadata.title
    }

    /// Display copy without the audio payload.
    pub fn info(&self) -> TrackInfo {
        TrackInfo {
            title: self.metadata.title.clone(),
            url: self.metadata.url.clone(),
            duration: self.metadata.duration(),
            thumbnail: self.metadata.thumbnail.clone(),
            requested_by: self.requested_by.clone(),
            added_at: self.added_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub title: String,
    pub url: String,
    pub duration: Duration,
    pub thumbnail: Option<String>,
    pub requested_by: String,
    pub added_at: DateTime<Utc>,
}
