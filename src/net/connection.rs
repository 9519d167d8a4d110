//! Connection registry shared between the network layer and the lifecycle manager.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Register connections while the process is running
//! - Refuse registration once shutdown has begun
//! - Unregister on guard drop and wake any drain waiter

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::lifecycle::error::{ConnectionError, LifecycleError};
use crate::lifecycle::state::SharedState;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A live connection as seen by the lifecycle manager.
///
/// The network layer owns the connection; the manager only observes it and,
/// when draining times out, asks it to terminate.
pub trait ConnectionHandle: Send + Sync {
    /// Human-readable peer description for logs.
    fn describe(&self) -> String {
        String::from("unknown peer")
    }

    /// Terminate the connection now, abandoning in-flight work.
    fn force_close(&self) -> Result<(), ConnectionError>;
}

/// Network-layer view of the lifecycle state.
#[derive(Clone)]
pub struct ConnectionRegistry {
    shared: Arc<SharedState>,
}

impl ConnectionRegistry {
    pub(crate) fn new(shared: Arc<SharedState>) -> Self {
        Self { shared }
    }

    /// Register a connection. Returns a guard that unregisters it on drop.
    ///
    /// Fails with [`LifecycleError::ShuttingDown`] once shutdown has begun.
    pub fn register(
        &self,
        handle: Arc<dyn ConnectionHandle>,
    ) -> Result<ConnectionGuard, LifecycleError> {
        let id = ConnectionId::new();
        let peer = handle.describe();
        self.shared.insert_connection(id, handle)?;
        tracing::trace!(connection_id = %id, peer = %peer, "Connection registered");

        Ok(ConnectionGuard {
            shared: Arc::clone(&self.shared),
            id,
        })
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> usize {
        self.shared.connection_count()
    }

    /// Whether new connections must be refused.
    pub fn is_shutting_down(&self) -> bool {
        self.shared.is_shutting_down()
    }

    /// Resolves once shutdown has begun.
    pub async fn shutdown_started(&self) {
        let mut rx: watch::Receiver<bool> = self.shared.subscribe_shutting_down();
        // The sender lives as long as the shared state we hold.
        let _ = rx.wait_for(|shutting_down| *shutting_down).await;
    }
}

/// Guard that tracks a connection's lifetime.
/// Unregisters the connection when dropped.
pub struct ConnectionGuard {
    shared: Arc<SharedState>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl std::fmt::Debug for ConnectionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionGuard").field("id", &self.id).finish()
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.shared.remove_connection(self.id) {
            tracing::trace!(connection_id = %self.id, "Connection closed");
        }
    }
}
