//! Configuration file watcher for hot reload.
//!
//! A valid change is swapped into the shared config and queued as a
//! `configuration_reload` restart; an invalid one is logged and ignored.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use crate::config::loader::load_config;
use crate::config::schema::AppConfig;
use crate::lifecycle::error::ResourceError;
use crate::lifecycle::manager::LifecycleManager;
use crate::lifecycle::request::{Metadata, RestartReason};
use crate::lifecycle::resource::ManagedResource;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<AppConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<AppConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned handle stops the watch when closed or dropped.
    pub fn run(self) -> Result<WatchHandle, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!(path = ?path, "Config file change detected, reloading");
                        match load_config(&path) {
                            Ok(new_config) => {
                                let _ = tx.send(new_config);
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                            }
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(WatchHandle {
            watcher: Mutex::new(Some(watcher)),
        })
    }
}

/// Owns the OS watch; closing it stops change notifications.
pub struct WatchHandle {
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl WatchHandle {
    pub fn is_active(&self) -> bool {
        self.watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[async_trait]
impl ManagedResource for WatchHandle {
    fn name(&self) -> &str {
        "config-watcher"
    }

    async fn close(&self) -> Result<(), ResourceError> {
        let watcher = self.watcher.lock().unwrap_or_else(PoisonError::into_inner).take();
        drop(watcher);
        Ok(())
    }
}

/// Apply reloaded configs and queue a reload restart for each.
pub async fn apply_reloads(
    mut updates: mpsc::UnboundedReceiver<AppConfig>,
    current: Arc<ArcSwap<AppConfig>>,
    manager: LifecycleManager,
    path: PathBuf,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let config = tokio::select! {
            update = updates.recv() => match update {
                Some(config) => config,
                None => break,
            },
            _ = shutdown.recv() => break,
        };

        current.store(Arc::new(config));

        let mut metadata = Metadata::new();
        metadata.insert("path".into(), path.display().to_string().into());
        if let Err(e) = manager.request_restart(RestartReason::ConfigurationReload, metadata) {
            tracing::debug!(error = %e, "Configuration reload restart not queued");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closing_handle_is_idempotent() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let (watcher, _updates) = ConfigWatcher::new(file.path());
        let handle = watcher.run().unwrap();

        assert!(handle.is_active());
        handle.close().await.unwrap();
        handle.close().await.unwrap();
        assert!(!handle.is_active());
    }
}
