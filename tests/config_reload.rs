//! Configuration reloads become queued restarts.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use lifecycle_manager::config::watcher::apply_reloads;
use lifecycle_manager::config::AppConfig;
use lifecycle_manager::lifecycle::{Priority, RestartReason};
use tokio::sync::mpsc;

mod common;

#[tokio::test(start_paused = true)]
async fn test_reload_swaps_config_and_queues_restart() {
    let h = common::harness();
    let current = Arc::new(ArcSwap::from_pointee(AppConfig::default()));
    let (tx, rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(apply_reloads(
        rx,
        Arc::clone(&current),
        h.manager.clone(),
        PathBuf::from("/etc/lifecycle/config.toml"),
        h.manager.background().subscribe(),
    ));

    let mut reloaded = AppConfig::default();
    reloaded.admin.api_key = "rotated".into();
    tx.send(reloaded).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(current.load().admin.api_key, "rotated");
    assert_eq!(h.manager.snapshot().queue_length, 1);

    let termination = h.manager.run().await.unwrap();
    assert_eq!(termination.reason, Some(RestartReason::ConfigurationReload));
    assert_eq!(RestartReason::ConfigurationReload.priority(), Priority::Medium);

    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reloads_stop_with_background_tasks() {
    let h = common::harness();
    let current = Arc::new(ArcSwap::from_pointee(AppConfig::default()));
    let (tx, rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(apply_reloads(
        rx,
        current,
        h.manager.clone(),
        PathBuf::from("config.toml"),
        h.manager.background().subscribe(),
    ));

    h.manager.background().trigger();
    task.await.unwrap();

    assert!(tx.send(AppConfig::default()).is_err(), "receiver dropped");
    assert_eq!(h.manager.snapshot().queue_length, 0);
}
