//! Single-flight download pipeline.
//!
//! At most one resolve+validate+download cycle runs at a time, process-wide.
//! Requests arriving while one is in flight wait in a FIFO backlog that is
//! drained when the running job finishes and by a periodic ticker.

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use serenity::model::id::{GuildId, UserId};
use std::{
    collections::VecDeque,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        player::{EnqueueOutcome, PlaybackDriver},
        track::Track,
        validator::TrackPolicy,
    },
    error::{MusicError, MusicResult},
    sources::{validate_query, MediaResolver},
};

/// Where results of backlogged downloads are reported.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: String);
}

pub struct DownloadRequest {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub requested_by: String,
    pub query: String,
    pub notifier: Arc<dyn Notifier>,
    generation: u64,
}

impl DownloadRequest {
    pub fn new(
        guild_id: GuildId,
        user_id: UserId,
        requested_by: impl Into<String>,
        query: impl Into<String>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            guild_id,
            user_id,
            requested_by: requested_by.into(),
            query: query.into(),
            notifier,
            generation: 0,
        }
    }
}

pub type DownloadResult = MusicResult<EnqueueOutcome>;

pub enum Submission {
    /// The job runs now; the handle yields its result.
    StartedImmediately(JoinHandle<DownloadResult>),
    /// The request waits in the backlog at this 1-based position; its result
    /// goes to the request's notifier.
    Queued { position: usize },
}

/// Reply text for a finished download.
pub fn describe(result: &DownloadResult) -> String {
    match result {
        Ok(outcome) if outcome.started => "Playing song.".to_string(),
        Ok(outcome) => format!(
            "Added **{}** to the queue (position {}).",
            outcome.title,
            outcome.position + 1
        ),
        Err(e) => e.to_string(),
    }
}

pub struct DownloadCoordinator {
    resolver: Arc<dyn MediaResolver>,
    driver: Arc<PlaybackDriver>,
    policy: TrackPolicy,
    in_flight: AtomicBool,
    backlog: Mutex<VecDeque<DownloadRequest>>,
}

/// Ownership of the in-flight slot; released on drop, including on panic.
struct InFlightPermit {
    coordinator: Arc<DownloadCoordinator>,
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        self.coordinator.in_flight.store(false, Ordering::Release);
    }
}

impl DownloadCoordinator {
    pub fn new(
        resolver: Arc<dyn MediaResolver>,
        driver: Arc<PlaybackDriver>,
        policy: TrackPolicy,
    ) -> Arc<Self> {
        Arc::new(Self {
            resolver,
            driver,
            policy,
            in_flight: AtomicBool::new(false),
            backlog: Mutex::new(VecDeque::new()),
        })
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.lock().len()
    }

    fn try_acquire(self: &Arc<Self>) -> Option<InFlightPermit> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightPermit {
                coordinator: self.clone(),
            })
    }

    pub async fn submit(self: &Arc<Self>, mut request: DownloadRequest) -> Submission {
        request.generation = self.driver.generation(request.guild_id).await;

        if let Some(permit) = self.try_acquire() {
            info!("⬇️ Descarga iniciada: {}", request.query);
            return Submission::StartedImmediately(self.spawn(permit, request, false));
        }

        let position = {
            let mut backlog = self.backlog.lock();
            backlog.push_back(request);
            backlog.len()
        };
        info!("⏳ Descarga en espera (posición {})", position);

        // The running job may have finished between the failed acquire and the push.
        self.drain_one();
        Submission::Queued { position }
    }

    /// Starts the oldest backlog entry if nothing is in flight.
    pub fn drain_one(self: &Arc<Self>) -> bool {
        let Some(permit) = self.try_acquire() else {
            return false;
        };
        let Some(request) = self.backlog.lock().pop_front() else {
            return false;
        };

        debug!("Procesando descarga en espera: {}", request.query);
        self.spawn(permit, request, true);
        true
    }

    fn spawn(
        self: &Arc<Self>,
        permit: InFlightPermit,
        request: DownloadRequest,
        from_backlog: bool,
    ) -> JoinHandle<DownloadResult> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let result = AssertUnwindSafe(coordinator.process(&request))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    error!("Pánico durante la descarga de {}", request.query);
                    Err(MusicError::DownloadFailed("unexpected resolver error".into()))
                });

            drop(permit);
            coordinator.drain_one();

            if from_backlog {
                let message = format!("<@{}> {}", request.user_id, describe(&result));
                request.notifier.notify(message).await;
            }
            result
        })
    }

    async fn process(&self, request: &DownloadRequest) -> DownloadResult {
        let guild_id = request.guild_id;
        if self.driver.generation(guild_id).await != request.generation {
            return Err(MusicError::Discarded(request.query.clone()));
        }

        self.driver.set_download_in_flight(guild_id, true).await;
        // A panicking resolver must not leave the guild flagged as downloading.
        let fetched = AssertUnwindSafe(self.fetch(request))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                error!("Pánico en el resolver para {}", request.query);
                Err(MusicError::DownloadFailed("unexpected resolver error".into()))
            });
        let result = match fetched {
            Ok(track) => self.driver.enqueue(guild_id, track, request.generation).await,
            Err(e) => Err(e),
        };
        self.driver.set_download_in_flight(guild_id, false).await;

        match &result {
            Ok(outcome) => info!("✅ Descarga completada: {}", outcome.title),
            Err(e) if e.is_user_error() => warn!("Descarga rechazada ({}): {}", request.query, e),
            Err(e) => error!("Descarga fallida ({}): {}", request.query, e),
        }
        result
    }

    async fn fetch(&self, request: &DownloadRequest) -> MusicResult<Track> {
        validate_query(&request.query)?;

        let metadata = self.resolver.metadata(&request.query).await?;
        self.policy.check(&metadata)?;

        let audio = self
            .resolver
            .download(&metadata, self.policy.max_size_bytes)
            .await?;
        self.policy.check_size(audio.len() as u64)?;

        Ok(Track::new(metadata, request.requested_by.clone(), audio))
    }

    /// Periodically drains the backlog so requests never wait on a missed wakeup.
    pub fn spawn_ticker(self: &Arc<Self>, period: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        if coordinator.drain_one() {
                            debug!(
                                "Ticker inició una descarga en espera ({} restantes)",
                                coordinator.backlog_len()
                            );
                        }
                    }
                }
            }
        })
    }
}
