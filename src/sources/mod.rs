//! # Sources
//!
//! Turns a track link into metadata and downloaded audio. Only YouTube watch
//! links are accepted, and every lookup goes through yt-dlp.

pub mod youtube;

use async_trait::async_trait;
use url::Url;

use crate::{
    audio::track::{AudioData, TrackMetadata},
    error::{MusicError, MusicResult},
};

pub use youtube::YtDlpResolver;

/// The only link shape `play` accepts.
pub const YOUTUBE_WATCH_PREFIX: &str = "https://www.youtube.com/watch?v=";

/// External service resolving a link into metadata and audio.
///
/// The backend is assumed to be non-reentrant; callers go through the
/// download coordinator, which never runs two lookups at once.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Looks up title, duration, size estimate and the audio location.
    async fn metadata(&self, url: &str) -> MusicResult<TrackMetadata>;

    /// Fetches the audio payload, giving up once it exceeds `max_bytes`.
    async fn download(&self, metadata: &TrackMetadata, max_bytes: u64) -> MusicResult<AudioData>;
}

/// Rejects anything that is not a YouTube watch link with a video id.
pub fn validate_query(query: &str) -> MusicResult<Url> {
    let query = query.trim();
    if !query.starts_with(YOUTUBE_WATCH_PREFIX) {
        return Err(MusicError::InvalidQuery);
    }

    let url = Url::parse(query).map_err(|_| MusicError::InvalidQuery)?;
    let has_video_id = url
        .query_pairs()
        .any(|(key, value)| key == "v" && !value.is_empty());
    if !has_video_id {
        return Err(MusicError::InvalidQuery);
    }

    Ok(url)
}
