//! Uncaught fault capture.
//!
//! # Sources
//! - Panics anywhere in the process (panic hook)
//! - Supervised tasks that return an error or panic
//!
//! Both become [`LifecycleEvent::Fault`] and end in an emergency shutdown.

use std::fmt;
use std::future::Future;
use std::panic::PanicHookInfo;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};

use crate::lifecycle::manager::LifecycleEvent;

/// An unrecoverable fault.
#[derive(Debug, Clone, Error)]
pub enum Fault {
    /// Uncaught synchronous fault.
    #[error("panic at {location}: {message}")]
    Panic { message: String, location: String },

    /// A supervised task returned an error.
    #[error("task {task} failed: {error}")]
    TaskFailed { task: String, error: String },

    /// A supervised task panicked.
    #[error("task {task} panicked")]
    TaskPanicked { task: String },
}

/// Forward every panic to the lifecycle manager, after the default hook runs.
pub fn install_panic_hook(events: mpsc::UnboundedSender<LifecycleEvent>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        previous(info);
        let _ = events.send(LifecycleEvent::Fault(panic_fault(info)));
    }));
}

fn panic_fault(info: &PanicHookInfo<'_>) -> Fault {
    let payload = info.payload();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    let location = info
        .location()
        .map(|l| format!("{}:{}", l.file(), l.line()))
        .unwrap_or_else(|| "unknown".to_string());

    Fault::Panic { message, location }
}

/// Spawn `task` and report a fault if it fails or panics.
///
/// Normal completion and cancellation are not faults.
pub fn spawn_supervised<F, E>(
    events: mpsc::UnboundedSender<LifecycleEvent>,
    name: &str,
    task: F,
) -> JoinHandle<()>
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let name = name.to_string();
    let inner = tokio::spawn(task);
    let abort = AbortOnDrop(inner.abort_handle());

    tokio::spawn(async move {
        let _abort = abort;
        let fault = match inner.await {
            Ok(Ok(())) => {
                tracing::debug!(task = %name, "Supervised task finished");
                return;
            }
            Ok(Err(e)) => Fault::TaskFailed {
                task: name,
                error: e.to_string(),
            },
            Err(e) if e.is_panic() => Fault::TaskPanicked { task: name },
            Err(_) => return,
        };

        tracing::error!(fault = %fault, "Supervised task fault");
        let _ = events.send(LifecycleEvent::Fault(fault));
    })
}

/// Aborting the supervisor aborts the task it watches.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
