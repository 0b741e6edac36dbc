//! Command façade shared by slash and prefix commands.
//!
//! Every method returns either a [`Reply`] or the [`MusicError`] whose text
//! is sent back to the user. Nothing here talks to Discord directly, the
//! handlers render the result.

use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use tracing::info;

use crate::{
    audio::{
        downloader::{describe, DownloadCoordinator, DownloadRequest, Notifier, Submission},
        player::{JoinOutcome, PlaybackDriver},
        queue::QueueSnapshot,
        track::TrackInfo,
    },
    bot::commands::Command,
    error::{MusicError, MusicResult},
    sources::validate_query,
};

pub const DOWNLOADING: &str = "Downloading...";
pub const DOWNLOAD_QUEUED: &str = "Your download will start shortly.";

/// Who issued a command and where.
pub struct Invocation {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub user_name: String,
    /// Voice channel the user is currently in, if any.
    pub user_channel: Option<ChannelId>,
    /// Text channel sink for results of backlogged downloads.
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    NowPlaying(TrackInfo),
    Queue(QueueSnapshot),
    Help,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

pub struct MusicService {
    driver: Arc<PlaybackDriver>,
    coordinator: Arc<DownloadCoordinator>,
}

impl MusicService {
    pub fn new(driver: Arc<PlaybackDriver>, coordinator: Arc<DownloadCoordinator>) -> Self {
        Self {
            driver,
            coordinator,
        }
    }

    pub fn driver(&self) -> &Arc<PlaybackDriver> {
        &self.driver
    }

    /// Runs a command to completion. `play` waits for its download here;
    /// handlers that acknowledge first use [`MusicService::start_play`].
    pub async fn execute(&self, invocation: &Invocation, command: Command) -> MusicResult<Reply> {
        match command {
            Command::Join(channel) => self.join(invocation, channel).await,
            Command::Leave => self.leave(invocation).await,
            Command::Play(url) => {
                let submission = self.start_play(invocation, &url).await?;
                Ok(Reply::Text(Self::finish_play(submission).await))
            }
            Command::Pause => {
                self.ensure_same_channel(invocation).await?;
                self.driver.pause(invocation.guild_id).await?;
                Ok(Reply::text("Paused the player."))
            }
            Command::Resume => {
                self.ensure_same_channel(invocation).await?;
                self.driver.resume(invocation.guild_id).await?;
                Ok(Reply::text("Resumed the player."))
            }
            Command::Stop => {
                self.ensure_same_channel(invocation).await?;
                self.driver.stop(invocation.guild_id).await?;
                Ok(Reply::text("Stopped the player and cleared queue."))
            }
            Command::Skip => {
                self.ensure_same_channel(invocation).await?;
                self.driver.skip(invocation.guild_id).await?;
                Ok(Reply::text("Skipped the song."))
            }
            Command::Loop => {
                self.ensure_same_channel(invocation).await?;
                let enabled = self.driver.toggle_loop(invocation.guild_id).await?;
                Ok(Reply::text(if enabled {
                    "Loop enabled."
                } else {
                    "Loop disabled."
                }))
            }
            Command::Volume(percent) => {
                self.ensure_same_channel(invocation).await?;
                let volume = self.driver.set_volume(invocation.guild_id, percent).await?;
                Ok(Reply::Text(format!("Changed the volume to {}.", volume)))
            }
            Command::Queue => {
                let snapshot = self.driver.snapshot(invocation.guild_id).await;
                if snapshot.is_empty() {
                    return Ok(Reply::text("The queue is empty."));
                }
                Ok(Reply::Queue(snapshot))
            }
            Command::Playing => self
                .driver
                .now_playing(invocation.guild_id)
                .await
                .map(Reply::NowPlaying)
                .ok_or(MusicError::NothingPlaying),
            Command::Help => Ok(Reply::Help),
        }
    }

    async fn join(&self, invocation: &Invocation, channel: Option<ChannelId>) -> MusicResult<Reply> {
        let target = channel
            .or(invocation.user_channel)
            .ok_or(MusicError::NotInVoiceChannel)?;

        let reply = match self.driver.join(invocation.guild_id, target).await? {
            JoinOutcome::Joined(channel) => format!("Joined <#{}>.", channel),
            JoinOutcome::Moved(channel) => format!("Moved to <#{}>.", channel),
            JoinOutcome::AlreadyThere(channel) => format!("Already in <#{}>.", channel),
        };
        Ok(Reply::Text(reply))
    }

    async fn leave(&self, invocation: &Invocation) -> MusicResult<Reply> {
        self.ensure_same_channel(invocation).await?;
        self.driver.leave(invocation.guild_id).await?;
        info!("👋 Desconectado del canal de voz en guild {}", invocation.guild_id);
        Ok(Reply::text("Left the voice channel."))
    }

    /// Rejections `play` can report before connecting or downloading.
    pub async fn check_play(&self, invocation: &Invocation, url: &str) -> MusicResult<()> {
        validate_query(url)?;

        match self.driver.session_channel(invocation.guild_id).await {
            Some(_) => self.ensure_same_channel(invocation).await,
            None => invocation
                .user_channel
                .map(|_| ())
                .ok_or(MusicError::NotInVoiceChannel),
        }
    }

    /// Joins the user's channel when there is no session and hands the
    /// request to the download coordinator.
    pub async fn start_play(&self, invocation: &Invocation, url: &str) -> MusicResult<Submission> {
        self.check_play(invocation, url).await?;

        if self.driver.session_channel(invocation.guild_id).await.is_none() {
            let channel = invocation.user_channel.ok_or(MusicError::NotInVoiceChannel)?;
            self.driver.join(invocation.guild_id, channel).await?;
        }

        let request = DownloadRequest::new(
            invocation.guild_id,
            invocation.user_id,
            invocation.user_name.clone(),
            url,
            invocation.notifier.clone(),
        );
        Ok(self.coordinator.submit(request).await)
    }

    /// Final reply for a submission: the download outcome, or the backlog notice.
    pub async fn finish_play(submission: Submission) -> String {
        match submission {
            Submission::StartedImmediately(handle) => {
                let result = handle
                    .await
                    .unwrap_or_else(|e| Err(MusicError::DownloadFailed(e.to_string())));
                describe(&result)
            }
            Submission::Queued { .. } => DOWNLOAD_QUEUED.to_string(),
        }
    }

    async fn ensure_same_channel(&self, invocation: &Invocation) -> MusicResult<()> {
        let session = self
            .driver
            .session_channel(invocation.guild_id)
            .await
            .ok_or(MusicError::NoActiveVoiceSession)?;
        if invocation.user_channel != Some(session) {
            return Err(MusicError::NotInSameChannel);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{player::PlaybackState, track::AudioData, validator::TrackPolicy},
        sources::{MediaResolver, MockMediaResolver},
        testing::{driver, metadata, track, CollectingNotifier, FakeConnector, GatedResolver},
    };
    use pretty_assertions::assert_eq;

    const GUILD: GuildId = GuildId::new(1);
    const VOICE: ChannelId = ChannelId::new(10);
    const OTHER_VOICE: ChannelId = ChannelId::new(11);

    struct Harness {
        service: MusicService,
        connector: Arc<FakeConnector>,
        notifier: Arc<CollectingNotifier>,
    }

    impl Harness {
        fn new(resolver: Arc<dyn MediaResolver>) -> Self {
            let (driver, connector, _events) = driver();
            let coordinator =
                DownloadCoordinator::new(resolver, driver.clone(), TrackPolicy::default());
            Self {
                service: MusicService::new(driver, coordinator),
                connector,
                notifier: Arc::new(CollectingNotifier::default()),
            }
        }

        fn from(&self, user_channel: Option<ChannelId>) -> Invocation {
            Invocation {
                guild_id: GUILD,
                user_id: UserId::new(7),
                user_name: "tester".into(),
                user_channel,
                notifier: self.notifier.clone(),
            }
        }

        async fn run(&self, user_channel: Option<ChannelId>, command: Command) -> MusicResult<Reply> {
            self.service.execute(&self.from(user_channel), command).await
        }
    }

    fn watch(video: &str) -> String {
        format!("https://www.youtube.com/watch?v={video}")
    }

    #[tokio::test]
    async fn test_play_on_idle_connected_guild() {
        let mut resolver = MockMediaResolver::new();
        resolver
            .expect_metadata()
            .withf(|url| url.ends_with("watch?v=abc"))
            .times(1)
            .returning(|_| Ok(metadata("X")));
        resolver
            .expect_download()
            .times(1)
            .returning(|_, _| Ok(AudioData::new(b"X".to_vec())));
        let h = Harness::new(Arc::new(resolver));
        h.run(Some(VOICE), Command::Join(None)).await.unwrap();

        let reply = h.run(Some(VOICE), Command::Play(watch("abc"))).await.unwrap();

        assert_eq!(reply, Reply::text("Playing song."));
        let snapshot = h.service.driver().snapshot(GUILD).await;
        assert_eq!(snapshot.current.unwrap().title, "X");
        assert!(snapshot.upcoming.is_empty());
        assert_eq!(h.connector.transport(GUILD).calls(), vec!["play:X"]);
    }

    #[tokio::test]
    async fn test_second_play_goes_to_backlog() {
        let resolver = GatedResolver::closed();
        let h = Harness::new(resolver.clone());
        let invocation = h.from(Some(VOICE));

        let first = h.service.start_play(&invocation, &watch("one")).await.unwrap();
        let second = h.service.start_play(&invocation, &watch("two")).await.unwrap();
        assert_eq!(MusicService::finish_play(second).await, DOWNLOAD_QUEUED);

        resolver.release(2);
        assert_eq!(MusicService::finish_play(first).await, "Playing song.");
        assert_eq!(
            h.notifier.wait_for(1).await,
            vec!["<@7> Added **two** to the queue (position 2)."]
        );
    }

    #[tokio::test]
    async fn test_stop_clears_three_tracks() {
        let h = Harness::new(GatedResolver::open());
        h.run(Some(VOICE), Command::Join(None)).await.unwrap();
        let driver = h.service.driver();
        for name in ["a", "b", "c"] {
            driver.enqueue(GUILD, track(name), 0).await.unwrap();
        }
        h.run(Some(VOICE), Command::Loop).await.unwrap();

        let reply = h.run(Some(VOICE), Command::Stop).await.unwrap();

        assert_eq!(reply, Reply::text("Stopped the player and cleared queue."));
        let snapshot = driver.snapshot(GUILD).await;
        assert!(snapshot.is_empty());
        assert!(!snapshot.loop_enabled);
        assert_eq!(h.connector.transport(GUILD).calls(), vec!["play:a", "stop"]);
    }

    #[tokio::test]
    async fn test_join_without_voice_channel() {
        let h = Harness::new(GatedResolver::open());

        let err = h.run(None, Command::Join(None)).await.unwrap_err();

        assert_eq!(err.to_string(), "You are not in a voice channel.");
        assert_eq!(h.connector.connects(), 0);
    }

    #[tokio::test]
    async fn test_join_then_move() {
        let h = Harness::new(GatedResolver::open());
        assert_eq!(
            h.run(Some(VOICE), Command::Join(None)).await.unwrap(),
            Reply::text("Joined <#10>.")
        );
        assert_eq!(
            h.run(Some(VOICE), Command::Join(Some(OTHER_VOICE))).await.unwrap(),
            Reply::text("Moved to <#11>.")
        );
    }

    #[tokio::test]
    async fn test_invalid_link_rejected_before_joining() {
        let mut resolver = MockMediaResolver::new();
        resolver.expect_metadata().never();
        let h = Harness::new(Arc::new(resolver));

        let err = h
            .run(Some(VOICE), Command::Play("https://youtu.be/abc".into()))
            .await
            .unwrap_err();

        assert_eq!(err, MusicError::InvalidQuery);
        assert_eq!(h.connector.connects(), 0);
    }

    #[tokio::test]
    async fn test_check_play_never_connects() {
        let h = Harness::new(GatedResolver::open());
        let url = watch("abc");

        assert_eq!(
            h.service.check_play(&h.from(None), &url).await,
            Err(MusicError::NotInVoiceChannel)
        );
        assert_eq!(
            h.service.check_play(&h.from(Some(VOICE)), "https://youtu.be/abc").await,
            Err(MusicError::InvalidQuery)
        );
        assert_eq!(h.service.check_play(&h.from(Some(VOICE)), &url).await, Ok(()));
        assert_eq!(h.connector.connects(), 0);

        h.run(Some(VOICE), Command::Join(None)).await.unwrap();
        assert_eq!(
            h.service.check_play(&h.from(Some(OTHER_VOICE)), &url).await,
            Err(MusicError::NotInSameChannel)
        );
    }

    #[tokio::test]
    async fn test_play_joins_user_channel() {
        let h = Harness::new(GatedResolver::open());

        h.run(Some(VOICE), Command::Play(watch("abc"))).await.unwrap();

        assert_eq!(h.service.driver().session_channel(GUILD).await, Some(VOICE));
        assert_eq!(h.service.driver().state(GUILD).await, PlaybackState::Playing);
    }

    #[tokio::test]
    async fn test_controls_require_same_channel() {
        let h = Harness::new(GatedResolver::open());
        assert_eq!(
            h.run(Some(VOICE), Command::Pause).await,
            Err(MusicError::NoActiveVoiceSession)
        );

        h.run(Some(VOICE), Command::Join(None)).await.unwrap();
        for command in [Command::Skip, Command::Volume(50), Command::Leave] {
            assert_eq!(
                h.run(Some(OTHER_VOICE), command).await,
                Err(MusicError::NotInSameChannel)
            );
        }
        assert_eq!(
            h.run(Some(OTHER_VOICE), Command::Play(watch("abc"))).await,
            Err(MusicError::NotInSameChannel)
        );
    }

    #[tokio::test]
    async fn test_volume_loop_and_leave_replies() {
        let h = Harness::new(GatedResolver::open());
        h.run(Some(VOICE), Command::Join(None)).await.unwrap();

        assert_eq!(
            h.run(Some(VOICE), Command::Volume(40)).await.unwrap(),
            Reply::text("Changed the volume to 40.")
        );
        assert_eq!(
            h.run(Some(VOICE), Command::Loop).await.unwrap(),
            Reply::text("Loop enabled.")
        );
        assert_eq!(
            h.run(Some(VOICE), Command::Loop).await.unwrap(),
            Reply::text("Loop disabled.")
        );
        assert_eq!(
            h.run(Some(VOICE), Command::Leave).await.unwrap(),
            Reply::text("Left the voice channel.")
        );
        assert_eq!(
            h.run(Some(VOICE), Command::Leave).await,
            Err(MusicError::NoActiveVoiceSession)
        );
    }

    #[tokio::test]
    async fn test_queue_and_playing_views() {
        let h = Harness::new(GatedResolver::open());
        assert_eq!(
            h.run(None, Command::Queue).await.unwrap(),
            Reply::text("The queue is empty.")
        );
        assert_eq!(
            h.run(None, Command::Playing).await,
            Err(MusicError::NothingPlaying)
        );

        h.run(Some(VOICE), Command::Play(watch("abc"))).await.unwrap();

        match h.run(None, Command::Playing).await.unwrap() {
            Reply::NowPlaying(info) => {
                assert_eq!(info.title, "abc");
                assert_eq!(info.requested_by, "tester");
            }
            other => panic!("unexpected reply {other:?}"),
        }
        match h.run(None, Command::Queue).await.unwrap() {
            Reply::Queue(snapshot) => assert_eq!(snapshot.len(), 1),
            other => panic!("unexpected reply {other:?}"),
        }
    }
}
