//! Metrics collection and exposition.
//!
//! # Metrics
//! - `lifecycle_active_connections` (gauge): registered connections
//! - `lifecycle_restart_queue_length` (gauge): pending restart requests
//! - `lifecycle_restart_requests_total` (counter): requests by reason, priority
//! - `lifecycle_forced_closures_total` (counter): connections killed at drain timeout
//! - `lifecycle_resource_close_failures_total` (counter): failed closes by resource
//! - `lifecycle_memory_ratio` (gauge): last sampled used/total memory
//! - `lifecycle_ignored_triggers_total` (counter): triggers that arrived mid-sequence

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::lifecycle::request::{Priority, RestartReason};

/// Install the Prometheus recorder and its HTTP scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics endpoint"),
    }
}

pub fn set_active_connections(count: usize) {
    ::metrics::gauge!("lifecycle_active_connections").set(count as f64);
}

pub fn set_queue_length(len: usize) {
    ::metrics::gauge!("lifecycle_restart_queue_length").set(len as f64);
}

pub fn record_restart_requested(reason: &RestartReason, priority: Priority) {
    ::metrics::counter!(
        "lifecycle_restart_requests_total",
        "reason" => reason.to_string(),
        "priority" => priority.as_str()
    )
    .increment(1);
}

pub fn record_forced_closure() {
    ::metrics::counter!("lifecycle_forced_closures_total").increment(1);
}

pub fn record_resource_close_failure(resource: &str) {
    ::metrics::counter!(
        "lifecycle_resource_close_failures_total",
        "resource" => resource.to_string()
    )
    .increment(1);
}

pub fn set_memory_ratio(ratio: f64) {
    ::metrics::gauge!("lifecycle_memory_ratio").set(ratio);
}

pub fn record_ignored_trigger(trigger: &str) {
    ::metrics::counter!(
        "lifecycle_ignored_triggers_total",
        "trigger" => trigger.to_string()
    )
    .increment(1);
}
