//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ratios in (0, 1])
//! - Validate addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::AppConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let lifecycle = &config.lifecycle;
    if lifecycle.drain_timeout_secs == 0 {
        errors.push(ValidationError::new("lifecycle.drain_timeout_secs", "must be greater than 0"));
    }
    if lifecycle.drain_poll_interval_ms == 0 {
        errors.push(ValidationError::new("lifecycle.drain_poll_interval_ms", "must be greater than 0"));
    }
    if lifecycle.resource_close_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "lifecycle.resource_close_timeout_secs",
            "must be greater than 0",
        ));
    }

    let health = &config.health;
    if health.sample_interval_secs == 0 {
        errors.push(ValidationError::new("health.sample_interval_secs", "must be greater than 0"));
    }
    if !(health.memory_threshold > 0.0 && health.memory_threshold <= 1.0) {
        errors.push(ValidationError::new(
            "health.memory_threshold",
            format!("must be in (0, 1], got {}", health.memory_threshold),
        ));
    }
    if health.memory_limit_bytes == Some(0) {
        errors.push(ValidationError::new("health.memory_limit_bytes", "must be greater than 0"));
    }

    if config.schedule.restart_after_secs == Some(0) {
        errors.push(ValidationError::new("schedule.restart_after_secs", "must be greater than 0"));
    }

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }
    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);

    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
    }

    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if let Err(e) = value.parse::<SocketAddr>() {
        errors.push(ValidationError::new(field, format!("invalid address {:?}: {}", value, e)));
    }
}
