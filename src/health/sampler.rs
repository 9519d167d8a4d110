//! Periodic health sampling.
//!
//! # Responsibilities
//! - Sample memory pressure and connection saturation on a fixed interval
//! - Queue a restart request for every exceeded threshold
//!
//! # Design Decisions
//! - Every detection is queued, even if the same condition was queued on the
//!   previous tick; ordering is the queue's job, not the sampler's
//! - Sampling stops as soon as shutdown begins

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::config::HealthConfig;
use crate::health::probe::MemoryProbe;
use crate::lifecycle::manager::LifecycleManager;
use crate::lifecycle::request::{Metadata, RestartReason, RestartRequest};
use crate::observability::metrics;

pub struct HealthSampler {
    manager: LifecycleManager,
    probe: Arc<dyn MemoryProbe>,
    config: HealthConfig,
}

impl HealthSampler {
    pub fn new(manager: LifecycleManager, probe: Arc<dyn MemoryProbe>, config: HealthConfig) -> Self {
        Self {
            manager,
            probe,
            config,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Health sampling disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.config.sample_interval_secs,
            memory_threshold = self.config.memory_threshold,
            max_connections = self.config.max_connections,
            "Health sampler starting"
        );

        let interval = Duration::from_secs(self.config.sample_interval_secs);
        // First tick one interval after start, not immediately.
        let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.manager.is_shutting_down() {
                        break;
                    }
                    self.sample_once();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health sampler received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Take one sample and queue a request per exceeded threshold.
    pub fn sample_once(&self) -> Vec<RestartRequest> {
        let mut queued = Vec::new();

        let memory = self.probe.sample();
        let ratio = memory.ratio();
        metrics::set_memory_ratio(ratio);

        if ratio > self.config.memory_threshold {
            tracing::warn!(
                ratio,
                threshold = self.config.memory_threshold,
                used_bytes = memory.used_bytes,
                "Memory pressure detected"
            );
            let mut metadata = Metadata::new();
            metadata.insert("heapUsed".into(), memory.used_bytes.into());
            metadata.insert("heapTotal".into(), memory.total_bytes.into());
            metadata.insert("ratio".into(), ratio.into());
            self.queue(RestartReason::HighMemoryUsage, metadata, &mut queued);
        }

        let connections = self.manager.registry().active_count();
        if connections > self.config.max_connections {
            tracing::warn!(
                connections,
                limit = self.config.max_connections,
                "Connection saturation detected"
            );
            let mut metadata = Metadata::new();
            metadata.insert("connectionCount".into(), connections.into());
            metadata.insert("limit".into(), self.config.max_connections.into());
            self.queue(RestartReason::TooManyConnections, metadata, &mut queued);
        }

        queued
    }

    fn queue(&self, reason: RestartReason, metadata: Metadata, queued: &mut Vec<RestartRequest>) {
        match self.manager.request_restart(reason, metadata) {
            Ok(request) => queued.push(request),
            Err(e) => tracing::debug!(error = %e, "Health restart not queued"),
        }
    }
}
