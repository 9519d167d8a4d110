//! Shared resources released during the `Closing` phase.

use async_trait::async_trait;

use crate::lifecycle::error::ResourceError;

/// A shared external resource (database client, file watcher, ...) the
/// manager closes during shutdown.
///
/// `close` must be idempotent. Resources are closed one at a time in
/// registration order; a failing close is logged and the sequence continues.
#[async_trait]
pub trait ManagedResource: Send + Sync {
    /// Name used in logs and metrics.
    fn name(&self) -> &str;

    async fn close(&self) -> Result<(), ResourceError>;
}
