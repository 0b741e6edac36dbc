//! Seams between the playback state machine and the voice connection.
//!
//! The driver only talks to [`VoiceTransport`] and [`VoiceConnector`]; the
//! songbird-backed implementations live in [`crate::audio::voice`].

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::{audio::track::AudioData, error::MusicResult};

/// Identifies one connection lifetime of a guild's voice session.
pub type SessionId = u64;

/// Identifies one `play` call on a transport.
pub type PlayToken = u64;

/// Emitted when the track a transport was playing ends on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackFinished {
    pub guild_id: GuildId,
    pub session: SessionId,
    /// Token returned by the `play` call that started the ended track.
    pub play: PlayToken,
}

/// Stable per-guild handle the transport fires when its current track ends.
///
/// Created once per voice session and handed to the connector, it replaces a
/// freshly built callback per track.
#[derive(Debug, Clone)]
pub struct FinishedSignal {
    guild_id: GuildId,
    session: SessionId,
    events: mpsc::UnboundedSender<TrackFinished>,
}

impl FinishedSignal {
    pub fn new(
        guild_id: GuildId,
        session: SessionId,
        events: mpsc::UnboundedSender<TrackFinished>,
    ) -> Self {
        Self {
            guild_id,
            session,
            events,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn fire(&self, play: PlayToken) {
        let event = TrackFinished {
            guild_id: self.guild_id,
            session: self.session,
            play,
        };
        if self.events.send(event).is_err() {
            debug!("Receptor de eventos cerrado, ignorando fin de track en guild {}", self.guild_id);
        }
    }
}

/// A live audio connection to one voice channel.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Replaces whatever is playing with `audio`, from its first byte.
    ///
    /// The returned token is carried by the finished signal of this track.
    async fn play(&self, audio: AudioData, volume: f32) -> MusicResult<PlayToken>;

    async fn pause(&self) -> MusicResult<()>;

    async fn resume(&self) -> MusicResult<()>;

    /// Stops the current track without firing the finished signal.
    async fn stop(&self) -> MusicResult<()>;

    async fn disconnect(&self) -> MusicResult<()>;

    async fn set_output_volume(&self, volume: f32) -> MusicResult<()>;

    async fn is_playing(&self) -> bool;

    async fn move_to(&self, channel_id: ChannelId) -> MusicResult<()>;

    fn channel(&self) -> ChannelId;
}

#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        finished: FinishedSignal,
    ) -> MusicResult<Arc<dyn VoiceTransport>>;
}
