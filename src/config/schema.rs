//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the lifecycle
//! manager and its demo server. All types derive Serde traits for
//! deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Drain, grace and restart behaviour.
    pub lifecycle: LifecycleConfig,

    /// Health sampler thresholds.
    pub health: HealthConfig,

    /// Scheduled restart timer.
    pub schedule: ScheduleConfig,

    /// Listener configuration (bind address, limits).
    pub listener: ListenerConfig,

    /// Admin diagnostics surface.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Watch the config file and queue a reload restart when it changes.
    pub watch: bool,
}

/// How a restart relaunches the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RestartMode {
    /// Exit and let the supervisor (systemd, Kubernetes, ...) start a new process.
    #[default]
    Supervisor,
    /// Spawn a fresh copy of the current executable before exiting.
    Respawn,
}

/// Shutdown sequence timing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Upper bound on waiting for connections to finish.
    pub drain_timeout_secs: u64,

    /// Backstop re-check interval while draining, in milliseconds.
    pub drain_poll_interval_ms: u64,

    /// Hold window before dispatching a low-priority restart.
    pub low_priority_grace_secs: u64,

    /// Upper bound on a single resource close.
    pub resource_close_timeout_secs: u64,

    pub restart_mode: RestartMode,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 30,
            drain_poll_interval_ms: 1000,
            low_priority_grace_secs: 5,
            resource_close_timeout_secs: 10,
            restart_mode: RestartMode::Supervisor,
        }
    }
}

/// Health sampler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Enable periodic health sampling.
    pub enabled: bool,

    /// Sampling interval in seconds.
    pub sample_interval_secs: u64,

    /// Used-to-total memory ratio above which a restart is queued.
    pub memory_threshold: f64,

    /// Connection count above which a restart is queued.
    pub max_connections: usize,

    /// Memory limit to measure against instead of physical memory.
    pub memory_limit_bytes: Option<u64>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_interval_secs: 30,
            memory_threshold: 0.90,
            max_connections: 1000,
            memory_limit_bytes: None,
        }
    }
}

/// Scheduled restart configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Queue a scheduled restart after this much uptime. Disabled when unset.
    pub restart_after_secs: Option<u64>,

    /// Random extra delay added to the schedule, spreads restarts of a fleet.
    pub jitter_secs: u64,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Admin surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
