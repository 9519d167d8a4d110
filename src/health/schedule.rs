//! Scheduled restarts.
//!
//! Queues a single `scheduled_restart` request once the process has been up
//! for the configured time, plus optional random jitter so a fleet does not
//! restart in lockstep.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::ScheduleConfig;
use crate::lifecycle::manager::LifecycleManager;
use crate::lifecycle::request::{Metadata, RestartReason};

pub struct RestartSchedule {
    manager: LifecycleManager,
    delay: Duration,
}

impl RestartSchedule {
    /// Returns `None` when no schedule is configured.
    pub fn from_config(manager: LifecycleManager, config: &ScheduleConfig) -> Option<Self> {
        let after = config.restart_after_secs?;
        let jitter = if config.jitter_secs > 0 {
            fastrand::u64(0..=config.jitter_secs)
        } else {
            0
        };

        Some(Self {
            manager,
            delay: Duration::from_secs(after.saturating_add(jitter)),
        })
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(delay_secs = self.delay.as_secs(), "Restart scheduled");

        tokio::select! {
            _ = tokio::time::sleep(self.delay) => {}
            _ = shutdown.recv() => {
                tracing::debug!("Restart schedule cancelled by shutdown");
                return;
            }
        }

        let mut metadata = Metadata::new();
        metadata.insert("uptimeSecs".into(), self.manager.uptime().as_secs().into());

        if let Err(e) = self.manager.request_restart(RestartReason::ScheduledRestart, metadata) {
            tracing::debug!(error = %e, "Scheduled restart not queued");
        }
    }
}
