//! Lifecycle error definitions.

use thiserror::Error;

/// Errors surfaced to callers of the lifecycle manager.
///
/// Failures inside a running shutdown sequence never show up here; they are
/// logged and reflected only in the exit code.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Shutdown has begun; new connections and restart requests are refused.
    #[error("shutdown in progress")]
    ShuttingDown,

    /// The control loop was already started for this manager.
    #[error("lifecycle control loop already running")]
    AlreadyRunning,

    /// The event channel to the control loop is gone.
    #[error("lifecycle event channel closed")]
    ChannelClosed,

    /// Installing an OS signal handler failed.
    #[error("failed to install {signal} handler: {source}")]
    Signal {
        signal: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Error returned by a [`ManagedResource`](crate::lifecycle::resource::ManagedResource) close.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Error returned when force-terminating a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The connection task is already gone.
    #[error("connection already closed")]
    AlreadyClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
