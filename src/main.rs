//! Lifecycle manager (v1)
//!
//! Runs a small TCP service under the lifecycle manager: connections are
//! tracked, drained on SIGTERM/SIGINT, and the process restarts itself on
//! SIGHUP/SIGUSR2 or when the health sampler or an operator asks for it.
//!
//! # Architecture Overview
//!
//! ```text
//!   SIGTERM/SIGINT/SIGHUP/SIGUSR2 ─┐
//!   panics / task failures ────────┤
//!                                  ▼
//!   health sampler ──┐     ┌────────────────────┐      ┌──────────────────┐
//!   restart schedule ├───▶ │  restart queue     │ ───▶ │ lifecycle manager│
//!   config watcher ──┤     │ (priority, FIFO)   │      │  control loop    │
//!   admin API ───────┘     └────────────────────┘      └────────┬─────────┘
//!                                                               │
//!                      Running → Draining → Closing → Terminated│
//!                                                               ▼
//!   listener ──▶ connection registry ◀── drain / force-close   exit(0|1)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use lifecycle_manager::config::loader::load_config;
use lifecycle_manager::config::AppConfig;
use lifecycle_manager::health::probe::SysinfoProbe;
use lifecycle_manager::lifecycle::startup;
use lifecycle_manager::lifecycle::ProcessTerminator;
use lifecycle_manager::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "lifecycle-manager")]
#[command(about = "TCP service with graceful shutdown and health-driven restarts", long_about = None)]
struct Args {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    logging::init(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "lifecycle-manager starting");
    tracing::info!(
        drain_timeout_secs = config.lifecycle.drain_timeout_secs,
        sample_interval_secs = config.health.sample_interval_secs,
        restart_mode = ?config.lifecycle.restart_mode,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let probe = Arc::new(SysinfoProbe::new(config.health.memory_limit_bytes));
    let exit = Arc::new(ProcessTerminator::new(config.lifecycle.restart_mode));

    let services = startup::start(config, args.config, probe, exit).await?;
    startup::install_process_hooks(&services.manager)?;

    let termination = services.manager.run().await?;

    // The terminator exits the process; reaching here means it returned.
    tracing::info!(exit_code = termination.exit_code, "Shutdown complete");
    std::process::exit(termination.exit_code);
}
