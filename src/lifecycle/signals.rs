//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP, SIGUSR2)
//! - Translate signals to lifecycle events
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Handlers only push events; the control loop decides what to do
//! - Repeated signals are forwarded too, the manager logs and ignores them

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::lifecycle::error::LifecycleError;
use crate::lifecycle::manager::LifecycleEvent;

/// External triggers delivered by the process supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// SIGTERM
    Terminate,
    /// SIGINT
    Interrupt,
    /// SIGHUP
    Reload,
    /// SIGUSR2
    UserRestart,
}

/// What a signal asks the manager to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    Shutdown,
    Restart,
}

impl Signal {
    pub fn name(&self) -> &'static str {
        match self {
            Signal::Terminate => "SIGTERM",
            Signal::Interrupt => "SIGINT",
            Signal::Reload => "SIGHUP",
            Signal::UserRestart => "SIGUSR2",
        }
    }

    pub fn action(&self) -> SignalAction {
        match self {
            Signal::Terminate | Signal::Interrupt => SignalAction::Shutdown,
            Signal::Reload | Signal::UserRestart => SignalAction::Restart,
        }
    }
}

/// Install handlers and forward every delivered signal to `events`.
///
/// The returned task runs until the event receiver is dropped.
#[cfg(unix)]
pub fn listen(events: mpsc::UnboundedSender<LifecycleEvent>) -> Result<JoinHandle<()>, LifecycleError> {
    use tokio::signal::unix::{signal, SignalKind};

    let install = |kind: SignalKind, name: &'static str| {
        signal(kind).map_err(|source| LifecycleError::Signal { signal: name, source })
    };

    let mut sigterm = install(SignalKind::terminate(), "SIGTERM")?;
    let mut sigint = install(SignalKind::interrupt(), "SIGINT")?;
    let mut sighup = install(SignalKind::hangup(), "SIGHUP")?;
    let mut sigusr2 = install(SignalKind::user_defined2(), "SIGUSR2")?;

    tracing::debug!("Signal handlers installed");

    Ok(tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                Some(()) = sigterm.recv() => Signal::Terminate,
                Some(()) = sigint.recv() => Signal::Interrupt,
                Some(()) = sighup.recv() => Signal::Reload,
                Some(()) = sigusr2.recv() => Signal::UserRestart,
                else => break,
            };

            tracing::info!(signal = received.name(), "Signal received");
            if events.send(LifecycleEvent::Signal(received)).is_err() {
                break;
            }
        }
    }))
}

/// Non-unix platforms only deliver Ctrl+C, treated as SIGINT.
#[cfg(not(unix))]
pub fn listen(events: mpsc::UnboundedSender<LifecycleEvent>) -> Result<JoinHandle<()>, LifecycleError> {
    Ok(tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Ctrl+C handler failed");
                break;
            }
            tracing::info!(signal = Signal::Interrupt.name(), "Signal received");
            if events.send(LifecycleEvent::Signal(Signal::Interrupt)).is_err() {
                break;
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_actions() {
        assert_eq!(Signal::Terminate.action(), SignalAction::Shutdown);
        assert_eq!(Signal::Interrupt.action(), SignalAction::Shutdown);
        assert_eq!(Signal::Reload.action(), SignalAction::Restart);
        assert_eq!(Signal::UserRestart.action(), SignalAction::Restart);
    }

    #[test]
    fn signal_names() {
        assert_eq!(Signal::Reload.name(), "SIGHUP");
        assert_eq!(Signal::UserRestart.name(), "SIGUSR2");
    }
}
