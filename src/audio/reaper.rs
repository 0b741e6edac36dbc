use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::audio::player::PlaybackDriver;

/// Periodic sweep disconnecting voice sessions whose transport is silent.
///
/// Runs independently of the playback state machine. A session that goes
/// quiet just before a new track starts may still be disconnected; the
/// per-guild download flag only narrows that window.
pub struct IdleReaper {
    driver: Arc<PlaybackDriver>,
}

impl IdleReaper {
    pub fn new(driver: Arc<PlaybackDriver>) -> Self {
        Self { driver }
    }

    /// Returns how many sessions were disconnected.
    pub async fn sweep(&self) -> usize {
        let mut reaped = 0;
        for guild_id in self.driver.guild_ids() {
            if self.driver.disconnect_if_idle(guild_id).await {
                reaped += 1;
            }
        }
        if reaped > 0 {
            info!("🧹 {} sesiones de voz inactivas cerradas", reaped);
        }
        reaped
    }

    pub fn spawn(self, period: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so fresh sessions get a full period.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        self.sweep().await;
                    }
                }
            }
            debug!("IdleReaper detenido");
        })
    }
}
