//! Fakes shared by the unit tests.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{mpsc, Semaphore};

use crate::{
    audio::{
        downloader::Notifier,
        player::{PlaybackDriver, PlayerSettings},
        track::{AudioData, Track, TrackMetadata},
        transport::{FinishedSignal, PlayToken, TrackFinished, VoiceConnector, VoiceTransport},
    },
    error::{MusicError, MusicResult},
    sources::MediaResolver,
};

/// Two minute, 1 MB track whose watch link ends in `title`.
pub fn metadata(title: &str) -> TrackMetadata {
    TrackMetadata {
        title: title.to_string(),
        url: format!("https://www.youtube.com/watch?v={title}"),
        duration_secs: 120,
        thumbnail: Some(format!("https://i.ytimg.com/vi/{title}/hqdefault.jpg")),
        estimated_size: 1_000_000,
        stream_url: Some(format!("https://media.example/{title}")),
    }
}

/// The audio payload is the title itself so fakes can tell tracks apart.
pub fn track(title: &str) -> Track {
    Track::new(metadata(title), "tester", AudioData::new(title.as_bytes().to_vec()))
}

pub fn driver() -> (
    Arc<PlaybackDriver>,
    Arc<FakeConnector>,
    mpsc::UnboundedReceiver<TrackFinished>,
) {
    let connector = Arc::new(FakeConnector::default());
    let (driver, events) = PlaybackDriver::new(connector.clone(), PlayerSettings::default());
    (driver, connector, events)
}

/// Records every call as a short string such as `play:X` or `stop`.
pub struct FakeTransport {
    channel: Mutex<ChannelId>,
    calls: Mutex<Vec<String>>,
    playing: AtomicBool,
    fail_play: AtomicBool,
    plays: AtomicU64,
}

impl FakeTransport {
    fn new(channel: ChannelId) -> Self {
        Self {
            channel: Mutex::new(channel),
            calls: Mutex::new(Vec::new()),
            playing: AtomicBool::new(false),
            fail_play: AtomicBool::new(false),
            plays: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::SeqCst);
    }

    /// Token of the most recent successful `play`.
    pub fn current_play(&self) -> PlayToken {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn fail_next_play(&self) {
        self.fail_play.store(true, Ordering::SeqCst);
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn play(&self, audio: AudioData, _volume: f32) -> MusicResult<PlayToken> {
        if self.fail_play.swap(false, Ordering::SeqCst) {
            return Err(MusicError::Voice("decoder refused input".into()));
        }
        let title = String::from_utf8_lossy(audio.as_bytes()).into_owned();
        self.record(format!("play:{title}"));
        self.set_playing(true);
        Ok(self.plays.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn pause(&self) -> MusicResult<()> {
        self.record("pause");
        self.set_playing(false);
        Ok(())
    }

    async fn resume(&self) -> MusicResult<()> {
        self.record("resume");
        self.set_playing(true);
        Ok(())
    }

    async fn stop(&self) -> MusicResult<()> {
        self.record("stop");
        self.set_playing(false);
        Ok(())
    }

    async fn disconnect(&self) -> MusicResult<()> {
        self.record("disconnect");
        self.set_playing(false);
        Ok(())
    }

    async fn set_output_volume(&self, volume: f32) -> MusicResult<()> {
        self.record(format!("volume:{volume}"));
        Ok(())
    }

    async fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    async fn move_to(&self, channel_id: ChannelId) -> MusicResult<()> {
        *self.channel.lock() = channel_id;
        Ok(())
    }

    fn channel(&self) -> ChannelId {
        *self.channel.lock()
    }
}

/// Hands out [`FakeTransport`]s and keeps each guild's finished signal.
#[derive(Default)]
pub struct FakeConnector {
    transports: DashMap<GuildId, Arc<FakeTransport>>,
    signals: DashMap<GuildId, FinishedSignal>,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub fn transport(&self, guild_id: GuildId) -> Arc<FakeTransport> {
        self.transports
            .get(&guild_id)
            .map(|t| t.clone())
            .expect("guild never connected")
    }

    /// Simulates the current track reaching its end.
    pub fn finish(&self, guild_id: GuildId) {
        let play = self.transport(guild_id).current_play();
        self.signals
            .get(&guild_id)
            .expect("guild never connected")
            .fire(play);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceConnector for FakeConnector {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        finished: FinishedSignal,
    ) -> MusicResult<Arc<dyn VoiceTransport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let transport = Arc::new(FakeTransport::new(channel_id));
        self.transports.insert(guild_id, transport.clone());
        self.signals.insert(guild_id, finished);
        Ok(transport)
    }
}

/// Resolver whose lookups block until the test releases permits.
pub struct GatedResolver {
    gate: Semaphore,
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: AtomicUsize,
    failing: Mutex<HashSet<String>>,
}

impl GatedResolver {
    pub fn closed() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            failing: Mutex::new(HashSet::new()),
        })
    }

    pub fn open() -> Arc<Self> {
        let resolver = Self::closed();
        resolver.release(1_000);
        resolver
    }

    pub fn release(&self, lookups: usize) {
        self.gate.add_permits(lookups);
    }

    pub fn fail_on(&self, url: &str) {
        self.failing.lock().insert(url.to_string());
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaResolver for GatedResolver {
    async fn metadata(&self, url: &str) -> MusicResult<TrackMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        self.gate.acquire().await.expect("gate closed").forget();
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.failing.lock().contains(url) {
            return Err(MusicError::DownloadFailed("Video unavailable".into()));
        }
        let title = url.rsplit("v=").next().unwrap_or(url);
        Ok(metadata(title))
    }

    async fn download(&self, metadata: &TrackMetadata, _max_bytes: u64) -> MusicResult<AudioData> {
        Ok(AudioData::new(metadata.title.as_bytes().to_vec()))
    }
}

#[derive(Default)]
pub struct CollectingNotifier {
    messages: Mutex<Vec<String>>,
}

impl CollectingNotifier {
    /// Waits up to two seconds for `count` messages.
    pub async fn wait_for(&self, count: usize) -> Vec<String> {
        for _ in 0..200 {
            let messages = self.messages.lock().clone();
            if messages.len() >= count {
                return messages;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} notifications, got {:?}", self.messages.lock());
    }
}

#[async_trait]
impl Notifier for CollectingNotifier {
    async fn notify(&self, message: String) {
        self.messages.lock().push(message);
    }
}
