//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the lifecycle manager from validated configuration
//! - Start background tasks (health sampler, restart schedule, config reloads)
//! - Bind the admin API and the listener, supervised for faults
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listener starts last (traffic only when ready)
//! - Process-global hooks (signals, panic hook) are installed separately so
//!   tests can start a full stack without touching them

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::admin::{self, AdminState};
use crate::config::watcher::{apply_reloads, ConfigWatcher};
use crate::config::AppConfig;
use crate::health::probe::MemoryProbe;
use crate::lifecycle::error::LifecycleError;
use crate::lifecycle::exit::ProcessExit;
use crate::lifecycle::fault;
use crate::lifecycle::manager::LifecycleManager;
use crate::lifecycle::signals;
use crate::net::listener::{Listener, ListenerError};

/// Error type for startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("Admin API bind failed: {0}")]
    AdminBind(std::io::Error),

    #[error("Config watcher failed: {0}")]
    Watch(#[from] notify::Error),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Everything `start` brought up.
pub struct Services {
    pub manager: LifecycleManager,
    pub config: Arc<ArcSwap<AppConfig>>,
    pub listener_addr: SocketAddr,
    pub admin_addr: Option<SocketAddr>,
}

pub async fn start(
    config: AppConfig,
    config_path: Option<PathBuf>,
    probe: Arc<dyn MemoryProbe>,
    exit: Arc<dyn ProcessExit>,
) -> Result<Services, StartupError> {
    let manager = LifecycleManager::new(config.lifecycle.clone(), Arc::clone(&probe), exit);
    let shared_config = Arc::new(ArcSwap::from_pointee(config.clone()));

    manager.spawn_health_sampler(config.health.clone(), probe);
    manager.spawn_restart_schedule(&config.schedule);

    match (config.watch, config_path) {
        (true, Some(path)) => {
            let (watcher, updates) = ConfigWatcher::new(&path);
            manager.register_resource(Arc::new(watcher.run()?));
            manager.spawn_background(apply_reloads(
                updates,
                Arc::clone(&shared_config),
                manager.clone(),
                path,
                manager.background().subscribe(),
            ));
        }
        (true, None) => {
            tracing::warn!("Config watching requested without a config file, ignoring");
        }
        (false, _) => {}
    }

    let admin_addr = if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address)
            .await
            .map_err(StartupError::AdminBind)?;
        let addr = listener.local_addr().map_err(StartupError::AdminBind)?;
        let state = AdminState {
            manager: manager.clone(),
            config: Arc::clone(&shared_config),
        };
        manager.spawn_supervised(
            "admin-api",
            admin::serve(listener, state, manager.background().subscribe()),
        );
        Some(addr)
    } else {
        None
    };

    let listener = Listener::bind(&config.listener).await?;
    let listener_addr = listener.local_addr().map_err(ListenerError::Bind)?;
    manager.spawn_supervised("listener", listener.serve(manager.registry()));

    tracing::info!(
        listener = %listener_addr,
        admin = ?admin_addr,
        "Startup complete"
    );

    Ok(Services {
        manager,
        config: shared_config,
        listener_addr,
        admin_addr,
    })
}

/// Route OS signals and panics into the manager. Call once per process.
pub fn install_process_hooks(manager: &LifecycleManager) -> Result<JoinHandle<()>, LifecycleError> {
    fault::install_panic_hook(manager.events());
    signals::listen(manager.events())
}
