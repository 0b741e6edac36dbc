use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        queue::{GuildQueue, QueueSnapshot, DEFAULT_QUEUE_CAPACITY, DEFAULT_VOLUME},
        track::{Track, TrackInfo},
        transport::{
            FinishedSignal, PlayToken, SessionId, TrackFinished, VoiceConnector, VoiceTransport,
        },
    },
    error::{MusicError, MusicResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy)]
pub struct PlayerSettings {
    pub queue_capacity: usize,
    pub default_volume: u8,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            default_volume: DEFAULT_VOLUME,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined(ChannelId),
    Moved(ChannelId),
    AlreadyThere(ChannelId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueOutcome {
    pub title: String,
    pub position: usize,
    pub started: bool,
}

#[derive(Clone)]
struct VoiceSession {
    id: SessionId,
    transport: Arc<dyn VoiceTransport>,
}

/// Everything the driver mutates for one guild, behind one lock.
struct GuildPlayer {
    queue: GuildQueue,
    state: PlaybackState,
    session: Option<VoiceSession>,
    /// Token of the transport play backing the front of the queue.
    current_play: Option<PlayToken>,
}

impl GuildPlayer {
    fn session(&self) -> MusicResult<VoiceSession> {
        self.session.clone().ok_or(MusicError::NoActiveVoiceSession)
    }

    /// Drops the session and everything queued for it.
    fn reset(&mut self) -> Option<VoiceSession> {
        self.queue.clear();
        self.state = PlaybackState::Idle;
        self.current_play = None;
        self.session.take()
    }
}

/// Playback state machine for every guild.
///
/// Guild players are created lazily on first access and never removed.
/// Command handlers and the track-finished event loop both go through the
/// per-guild lock, so transitions for one guild never interleave.
pub struct PlaybackDriver {
    guilds: DashMap<GuildId, Arc<Mutex<GuildPlayer>>>,
    connector: Arc<dyn VoiceConnector>,
    events: mpsc::UnboundedSender<TrackFinished>,
    next_session: AtomicU64,
    settings: PlayerSettings,
}

impl PlaybackDriver {
    /// Returns the driver and the receiving end of its track-finished events,
    /// to be handed to [`PlaybackDriver::run_events`].
    pub fn new(
        connector: Arc<dyn VoiceConnector>,
        settings: PlayerSettings,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<TrackFinished>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let driver = Arc::new(Self {
            guilds: DashMap::new(),
            connector,
            events,
            next_session: AtomicU64::new(0),
            settings,
        });
        (driver, receiver)
    }

    fn player(&self, guild_id: GuildId) -> Arc<Mutex<GuildPlayer>> {
        self.guilds
            .entry(guild_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(GuildPlayer {
                    queue: GuildQueue::new(
                        self.settings.queue_capacity,
                        self.settings.default_volume,
                    ),
                    state: PlaybackState::Idle,
                    session: None,
                    current_play: None,
                }))
            })
            .clone()
    }

    pub fn guild_ids(&self) -> Vec<GuildId> {
        self.guilds.iter().map(|entry| *entry.key()).collect()
    }

    /// Consumes track-finished events until shutdown.
    pub async fn run_events(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<TrackFinished>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.on_track_finished(event).await,
                    None => break,
                },
            }
        }
        debug!("Bucle de eventos de reproducción terminado");
    }

    pub async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<JoinOutcome> {
        let player = self.player(guild_id);
        let mut player = player.lock().await;

        if let Some(session) = &player.session {
            if session.transport.channel() == channel_id {
                return Ok(JoinOutcome::AlreadyThere(channel_id));
            }
            session.transport.move_to(channel_id).await?;
            info!("🔀 Movido al canal {} en guild {}", channel_id, guild_id);
            return Ok(JoinOutcome::Moved(channel_id));
        }

        let id = self.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        let signal = FinishedSignal::new(guild_id, id, self.events.clone());
        let transport = self.connector.connect(guild_id, channel_id, signal).await?;

        player.session = Some(VoiceSession { id, transport });
        player.state = PlaybackState::Idle;
        Ok(JoinOutcome::Joined(channel_id))
    }

    pub async fn leave(&self, guild_id: GuildId) -> MusicResult<()> {
        let player = self.player(guild_id);
        let mut player = player.lock().await;

        let session = player.session()?;
        player.reset();
        session.transport.disconnect().await
    }

    /// The bot was removed from its voice channel by someone else.
    pub async fn on_disconnected(&self, guild_id: GuildId) {
        let Some(player) = self.guilds.get(&guild_id).map(|p| p.clone()) else {
            return;
        };
        let mut player = player.lock().await;

        if let Some(session) = player.reset() {
            info!("🔌 Sesión de voz {} perdida en guild {}", session.id, guild_id);
            if let Err(e) = session.transport.disconnect().await {
                debug!("Desconexión tras pérdida de sesión: {}", e);
            }
        }
    }

    /// Appends a downloaded track and starts playback if the guild is idle.
    ///
    /// `generation` is the queue generation observed when the download was
    /// requested; a stop since then discards the track.
    pub async fn enqueue(
        &self,
        guild_id: GuildId,
        track: Track,
        generation: u64,
    ) -> MusicResult<EnqueueOutcome> {
        let player = self.player(guild_id);
        let mut player = player.lock().await;

        if player.queue.generation() != generation {
            info!("🗑️ Descarga descartada tras stop: {}", track.title());
            return Err(MusicError::Discarded(track.metadata.title));
        }
        let session = player.session()?;

        let title = track.metadata.title.clone();
        let position = player.queue.enqueue(track)?;

        let mut started = false;
        if player.state == PlaybackState::Idle {
            let volume = player.queue.volume_fraction();
            let audio = match player.queue.peek_current() {
                Some(current) => current.audio.clone(),
                None => return Err(MusicError::NothingPlaying),
            };
            match session.transport.play(audio, volume).await {
                Ok(token) => player.current_play = Some(token),
                Err(e) => {
                    error!("Error al iniciar reproducción en guild {}: {}", guild_id, e);
                    player.queue.skip();
                    return Err(e);
                }
            }
            player.state = PlaybackState::Playing;
            started = true;
            info!("🎵 Reproduciendo: {}", title);
        }

        Ok(EnqueueOutcome {
            title,
            position,
            started,
        })
    }

    pub async fn on_track_finished(&self, event: TrackFinished) {
        let Some(player) = self.guilds.get(&event.guild_id).map(|p| p.clone()) else {
            debug!("Fin de track para guild desconocida {}", event.guild_id);
            return;
        };
        let mut player = player.lock().await;

        let session = match &player.session {
            Some(session) if session.id == event.session => session.clone(),
            _ => {
                debug!("Fin de track de una sesión obsoleta en guild {}", event.guild_id);
                return;
            }
        };
        if player.current_play != Some(event.play) {
            debug!("Fin de track ya reemplazado en guild {}", event.guild_id);
            return;
        }
        if player.state != PlaybackState::Playing {
            debug!("Fin de track ignorado, estado {:?}", player.state);
            return;
        }

        player.current_play = None;
        if player.queue.advance().is_none() {
            player.state = PlaybackState::Idle;
            info!("⏹️ Cola terminada en guild {}", event.guild_id);
            return;
        }
        self.play_current(event.guild_id, &mut player, &session).await;
    }

    /// Plays the front of the queue, dropping tracks the transport refuses.
    async fn play_current(
        &self,
        guild_id: GuildId,
        player: &mut GuildPlayer,
        session: &VoiceSession,
    ) -> Option<String> {
        loop {
            let Some(current) = player.queue.peek_current() else {
                player.state = PlaybackState::Idle;
                player.current_play = None;
                return None;
            };
            let title = current.metadata.title.clone();
            let audio = current.audio.clone();

            match session
                .transport
                .play(audio, player.queue.volume_fraction())
                .await
            {
                Ok(token) => {
                    player.current_play = Some(token);
                    player.state = PlaybackState::Playing;
                    info!("🎵 Reproduciendo: {}", title);
                    return Some(title);
                }
                Err(e) => {
                    error!("Error al reproducir {} en guild {}: {}", title, guild_id, e);
                    player.queue.skip();
                }
            }
        }
    }

    /// Stops the current track and plays the next one, ignoring loop.
    pub async fn skip(&self, guild_id: GuildId) -> MusicResult<Option<String>> {
        let player = self.player(guild_id);
        let mut player = player.lock().await;

        let session = player.session()?;
        if player.state == PlaybackState::Idle || player.queue.is_empty() {
            return Err(MusicError::NothingPlaying);
        }

        session.transport.stop().await?;
        player.current_play = None;
        player.queue.skip();
        let next = self.play_current(guild_id, &mut player, &session).await;
        if next.is_none() {
            info!("⏹️ Cola terminada en guild {}", guild_id);
        }
        Ok(next)
    }

    pub async fn pause(&self, guild_id: GuildId) -> MusicResult<()> {
        let player = self.player(guild_id);
        let mut player = player.lock().await;

        let session = player.session()?;
        match player.state {
            PlaybackState::Playing => {
                session.transport.pause().await?;
                player.state = PlaybackState::Paused;
                info!("⏸️ Reproducción pausada");
                Ok(())
            }
            PlaybackState::Paused => Err(MusicError::AlreadyPaused),
            PlaybackState::Idle => Err(MusicError::NothingPlaying),
        }
    }

    pub async fn resume(&self, guild_id: GuildId) -> MusicResult<()> {
        let player = self.player(guild_id);
        let mut player = player.lock().await;

        let session = player.session()?;
        match player.state {
            PlaybackState::Paused => {
                session.transport.resume().await?;
                player.state = PlaybackState::Playing;
                info!("▶️ Reproducción reanudada");
                Ok(())
            }
            PlaybackState::Playing => Err(MusicError::NotPaused),
            PlaybackState::Idle => Err(MusicError::NothingPlaying),
        }
    }

    /// Clears the queue and stops the transport.
    pub async fn stop(&self, guild_id: GuildId) -> MusicResult<()> {
        let player = self.player(guild_id);
        let mut player = player.lock().await;

        let session = player.session()?;
        player.queue.clear();
        player.state = PlaybackState::Idle;
        player.current_play = None;
        session.transport.stop().await?;
        info!("⏹️ Reproducción detenida");
        Ok(())
    }

    pub async fn set_volume(&self, guild_id: GuildId, percent: i64) -> MusicResult<u8> {
        let percent = u8::try_from(percent)
            .ok()
            .filter(|p| *p <= 100)
            .ok_or(MusicError::InvalidVolume(percent))?;

        let player = self.player(guild_id);
        let mut player = player.lock().await;

        let session = player.session()?;
        player.queue.set_volume(percent);
        if player.state != PlaybackState::Idle {
            session
                .transport
                .set_output_volume(player.queue.volume_fraction())
                .await?;
        }
        info!("🔊 Volumen ajustado a {}% en guild {}", percent, guild_id);
        Ok(percent)
    }

    pub async fn toggle_loop(&self, guild_id: GuildId) -> MusicResult<bool> {
        let player = self.player(guild_id);
        let mut player = player.lock().await;

        player.session()?;
        Ok(player.queue.toggle_loop())
    }

    pub async fn now_playing(&self, guild_id: GuildId) -> Option<TrackInfo> {
        let player = self.player(guild_id);
        let player = player.lock().await;
        match player.state {
            PlaybackState::Idle => None,
            _ => player.queue.peek_current().map(Track::info),
        }
    }

    pub async fn snapshot(&self, guild_id: GuildId) -> QueueSnapshot {
        let player = self.player(guild_id);
        let player = player.lock().await;
        player.queue.snapshot()
    }

    pub async fn state(&self, guild_id: GuildId) -> PlaybackState {
        let player = self.player(guild_id);
        let player = player.lock().await;
        player.state
    }

    pub async fn session_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let player = self.player(guild_id);
        let player = player.lock().await;
        player.session.as_ref().map(|s| s.transport.channel())
    }

    pub async fn generation(&self, guild_id: GuildId) -> u64 {
        let player = self.player(guild_id);
        let player = player.lock().await;
        player.queue.generation()
    }

    pub async fn set_download_in_flight(&self, guild_id: GuildId, in_flight: bool) {
        let player = self.player(guild_id);
        let mut player = player.lock().await;
        player.queue.set_download_in_flight(in_flight);
    }

    /// Disconnects the guild's session if its transport is not playing.
    ///
    /// Guilds with a download being processed are left alone.
    pub async fn disconnect_if_idle(&self, guild_id: GuildId) -> bool {
        let Some(player) = self.guilds.get(&guild_id).map(|p| p.clone()) else {
            return false;
        };
        let mut player = player.lock().await;

        let Some(session) = player.session.clone() else {
            return false;
        };
        if player.queue.download_in_flight() || session.transport.is_playing().await {
            return false;
        }

        player.reset();
        if let Err(e) = session.transport.disconnect().await {
            warn!("Error al desconectar sesión inactiva en guild {}: {}", guild_id, e);
        }
        info!("💤 Sesión inactiva desconectada en guild {}", guild_id);
        true
    }
}
