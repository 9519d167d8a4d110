//! Restart requests and their priorities.
//!
//! # Priority Table
//! ```text
//! high_memory_usage     → High
//! too_many_connections  → High
//! configuration_reload  → Medium
//! manual_restart        → Medium
//! scheduled_restart     → Low
//! anything else         → Low
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

/// Why a restart was requested.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RestartReason {
    HighMemoryUsage,
    TooManyConnections,
    ConfigurationReload,
    ScheduledRestart,
    ManualRestart,
    /// A reason this build does not recognize (e.g. sent by a newer admin client).
    Other(String),
}

impl RestartReason {
    /// Parse a snake_case reason name. Unknown names are kept as `Other`.
    pub fn parse(name: &str) -> Self {
        match name {
            "high_memory_usage" => Self::HighMemoryUsage,
            "too_many_connections" => Self::TooManyConnections,
            "configuration_reload" => Self::ConfigurationReload,
            "scheduled_restart" => Self::ScheduledRestart,
            "manual_restart" => Self::ManualRestart,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::HighMemoryUsage => "high_memory_usage",
            Self::TooManyConnections => "too_many_connections",
            Self::ConfigurationReload => "configuration_reload",
            Self::ScheduledRestart => "scheduled_restart",
            Self::ManualRestart => "manual_restart",
            Self::Other(name) => name,
        }
    }

    /// Fixed priority lookup.
    pub fn priority(&self) -> Priority {
        match self {
            Self::HighMemoryUsage | Self::TooManyConnections => Priority::High,
            Self::ConfigurationReload | Self::ManualRestart => Priority::Medium,
            Self::ScheduledRestart | Self::Other(_) => Priority::Low,
        }
    }
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for RestartReason {
    fn from(name: String) -> Self {
        Self::parse(&name)
    }
}

impl From<RestartReason> for String {
    fn from(reason: RestartReason) -> Self {
        reason.as_str().to_string()
    }
}

/// Dispatch priority. Variant order gives `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostic values attached to a request (observed heap ratio, connection count, ...).
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// An immutable, queued intent to restart the process.
#[derive(Debug, Clone, Serialize)]
pub struct RestartRequest {
    /// Correlates the enqueue and dispatch log lines.
    pub id: Uuid,
    pub reason: RestartReason,
    pub priority: Priority,
    pub metadata: Metadata,
    /// Wall-clock creation time in milliseconds since the Unix epoch.
    pub requested_at_ms: u64,
    /// Monotonic creation time used for ordering.
    #[serde(skip)]
    pub timestamp: Instant,
}

impl RestartRequest {
    /// Create a request; the priority is derived from the reason.
    pub fn new(reason: RestartReason, metadata: Metadata) -> Self {
        let requested_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        Self {
            id: Uuid::new_v4(),
            priority: reason.priority(),
            reason,
            metadata,
            requested_at_ms,
            timestamp: Instant::now(),
        }
    }

    /// Add one metadata entry.
    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}
