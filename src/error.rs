//! Error taxonomy for the music pipeline.
//!
//! Every variant is recovered at the command boundary and turned into a reply,
//! so the `Display` text of each variant is exactly what the user reads.

use thiserror::Error;

use crate::sources::YOUTUBE_WATCH_PREFIX;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MusicError {
    #[error("Only links starting with {} are supported.", YOUTUBE_WATCH_PREFIX)]
    InvalidQuery,

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("The song is too long ({duration}s, the limit is {limit}s).")]
    TrackTooLong { duration: u64, limit: u64 },

    #[error("The song is too large ({size} bytes, the limit is {limit} bytes).")]
    TrackTooLarge { size: u64, limit: u64 },

    #[error("The queue is full (max {0} songs).")]
    QueueFull(usize),

    #[error("I am not in a voice channel.")]
    NoActiveVoiceSession,

    #[error("You must be in the same voice channel as me.")]
    NotInSameChannel,

    #[error("You are not in a voice channel.")]
    NotInVoiceChannel,

    #[error("Nothing is playing.")]
    NothingPlaying,

    #[error("The player is already paused.")]
    AlreadyPaused,

    #[error("The player is not paused.")]
    NotPaused,

    #[error("Volume must be between 0 and 100, got {0}.")]
    InvalidVolume(i64),

    #[error("The player was stopped before the download finished, discarded {0}.")]
    Discarded(String),

    #[error("Voice connection error: {0}")]
    Voice(String),
}

impl MusicError {
    /// Errors caused by the request itself rather than by the bot.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, Self::DownloadFailed(_) | Self::Voice(_))
    }
}

pub type MusicResult<T> = Result<T, MusicError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_user_facing_messages() {
        assert_eq!(
            MusicError::NotInVoiceChannel.to_string(),
            "You are not in a voice channel."
        );
        assert_eq!(
            MusicError::QueueFull(10).to_string(),
            "The queue is full (max 10 songs)."
        );
        assert!(MusicError::InvalidQuery
            .to_string()
            .contains("https://www.youtube.com/watch?v="));
    }

    #[test]
    fn test_user_error_classification() {
        assert!(MusicError::QueueFull(10).is_user_error());
        assert!(!MusicError::DownloadFailed("timeout".into()).is_user_error());
        assert!(!MusicError::Voice("gateway".into()).is_user_error());
    }
}
