//! # Audio Module
//!
//! Per-guild playback queue and download pipeline.
//!
//! A `play` request flows through these pieces:
//!
//! 1. [`downloader::DownloadCoordinator`] runs it now or parks it in the
//!    backlog, so the resolver never sees two lookups at once.
//! 2. [`crate::sources::MediaResolver`] fetches metadata, then audio.
//! 3. [`validator::TrackPolicy`] rejects tracks that are too long or too large.
//! 4. [`player::PlaybackDriver`] appends the track to the guild's
//!    [`queue::GuildQueue`] and starts it if the guild was idle.
//!
//! The voice connection fires a track-finished event for the current track,
//! and the driver advances the queue in response. [`reaper::IdleReaper`]
//! periodically disconnects sessions that stopped making sound.
//!
//! ## Example
//!
//! ```rust,ignore
//! let (driver, events) = PlaybackDriver::new(connector, PlayerSettings::default());
//! tokio::spawn(driver.clone().run_events(events, shutdown.clone()));
//!
//! driver.join(guild_id, channel_id).await?;
//! let coordinator = DownloadCoordinator::new(resolver, driver.clone(), TrackPolicy::default());
//! coordinator.submit(request).await;
//! ```

pub mod downloader;
pub mod player;
pub mod queue;
pub mod reaper;
pub mod track;
pub mod transport;
pub mod validator;
pub mod voice;
