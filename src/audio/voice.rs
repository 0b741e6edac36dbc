use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tracing::{debug, error, info};

use crate::{
    audio::{
        track::AudioData,
        transport::{FinishedSignal, PlayToken, VoiceConnector, VoiceTransport},
    },
    error::{MusicError, MusicResult},
};

type CurrentTrack = Arc<Mutex<Option<(TrackHandle, PlayToken)>>>;

/// Joins voice channels through the songbird manager registered on the client.
pub struct SongbirdConnector {
    manager: Arc<Songbird>,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        finished: FinishedSignal,
    ) -> MusicResult<Arc<dyn VoiceTransport>> {
        let call = self.manager.join(guild_id, channel_id).await.map_err(|e| {
            error!("Error al conectar al canal de voz: {:?}", e);
            MusicError::Voice(e.to_string())
        })?;

        let current: CurrentTrack = Arc::new(Mutex::new(None));
        {
            let mut handler = call.lock().await;
            handler.remove_all_global_events();
            handler.add_global_event(
                Event::Track(TrackEvent::End),
                TrackEndNotifier {
                    current: current.clone(),
                    signal: finished,
                },
            );
        }

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);

        Ok(Arc::new(SongbirdTransport {
            manager: self.manager.clone(),
            guild_id,
            channel: RwLock::new(channel_id),
            call,
            current,
            plays: AtomicU64::new(0),
        }))
    }
}

/// Voice transport over a songbird [`Call`].
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    channel: RwLock<ChannelId>,
    call: Arc<tokio::sync::Mutex<Call>>,
    current: CurrentTrack,
    plays: AtomicU64,
}

impl SongbirdTransport {
    fn current(&self) -> Option<TrackHandle> {
        self.current.lock().as_ref().map(|(handle, _)| handle.clone())
    }
}

fn control_error(e: impl std::fmt::Display) -> MusicError {
    MusicError::Voice(e.to_string())
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn play(&self, audio: AudioData, volume: f32) -> MusicResult<PlayToken> {
        // Forget the old handle first so its End event is not taken as ours.
        let previous = self.current.lock().take();
        if let Some((previous, _)) = previous {
            if let Err(e) = previous.stop() {
                debug!("Track anterior ya detenido en guild {}: {}", self.guild_id, e);
            }
        }

        let handle = {
            let mut call = self.call.lock().await;
            call.play_only_input(audio.to_input())
        };
        handle.set_volume(volume).map_err(control_error)?;
        let token = self.plays.fetch_add(1, Ordering::Relaxed) + 1;
        *self.current.lock() = Some((handle, token));
        Ok(token)
    }

    async fn pause(&self) -> MusicResult<()> {
        match self.current() {
            Some(handle) => handle.pause().map_err(control_error),
            None => Err(MusicError::NothingPlaying),
        }
    }

    async fn resume(&self) -> MusicResult<()> {
        match self.current() {
            Some(handle) => handle.play().map_err(control_error),
            None => Err(MusicError::NothingPlaying),
        }
    }

    async fn stop(&self) -> MusicResult<()> {
        let previous = self.current.lock().take();
        if let Some((handle, _)) = previous {
            handle.stop().map_err(control_error)?;
        }
        Ok(())
    }

    async fn disconnect(&self) -> MusicResult<()> {
        self.current.lock().take();
        self.manager
            .remove(self.guild_id)
            .await
            .map_err(control_error)?;
        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        Ok(())
    }

    async fn set_output_volume(&self, volume: f32) -> MusicResult<()> {
        if let Some(handle) = self.current() {
            handle.set_volume(volume).map_err(control_error)?;
        }
        Ok(())
    }

    async fn is_playing(&self) -> bool {
        let Some(handle) = self.current() else {
            return false;
        };
        match handle.get_info().await {
            Ok(info) => info.playing == PlayMode::Play,
            Err(_) => false,
        }
    }

    async fn move_to(&self, channel_id: ChannelId) -> MusicResult<()> {
        self.manager
            .join(self.guild_id, channel_id)
            .await
            .map_err(control_error)?;
        *self.channel.write() = channel_id;
        Ok(())
    }

    fn channel(&self) -> ChannelId {
        *self.channel.read()
    }
}

/// Global `TrackEvent::End` handler registered once per call.
struct TrackEndNotifier {
    current: CurrentTrack,
    signal: FinishedSignal,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(track_list) = ctx {
            for (_state, handle) in *track_list {
                let ended = {
                    let mut current = self.current.lock();
                    match current.as_ref() {
                        Some((playing, token)) if playing.uuid() == handle.uuid() => {
                            let token = *token;
                            current.take();
                            Some(token)
                        }
                        _ => None,
                    }
                };

                if let Some(token) = ended {
                    debug!("🎵 Track terminó en guild {}", self.signal.guild_id());
                    self.signal.fire(token);
                }
            }
        }

        None
    }
}
