//! Shared lifecycle state.
//!
//! # State Machine
//! ```text
//! Running → Draining → Closing → Terminated
//! ```
//! There is no transition back to `Running`. The `shutting_down` flag flips
//! exactly once and has no setter that clears it.
//!
//! # Design Decisions
//! - One mutex guards flag, phase, connections and queue
//! - The lock is never held across an await point
//! - Connection count and the flag are also published on watch channels so
//!   waiters never have to hold the lock

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::watch;

use crate::health::probe::MemoryUsage;
use crate::lifecycle::error::LifecycleError;
use crate::lifecycle::queue::RestartQueue;
use crate::lifecycle::request::{Priority, RestartRequest};
use crate::net::connection::{ConnectionHandle, ConnectionId};
use crate::observability::metrics;

/// Where the process is in its shutdown sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Running,
    Draining,
    Closing,
    Terminated,
}

/// State guarded by the lifecycle mutex.
pub(crate) struct LifecycleState {
    shutting_down: bool,
    phase: Phase,
    connections: HashMap<ConnectionId, Arc<dyn ConnectionHandle>>,
    queue: RestartQueue,
}

/// Lock-protected state plus the watch channels that publish it.
pub(crate) struct SharedState {
    inner: Mutex<LifecycleState>,
    connections_tx: watch::Sender<usize>,
    shutting_down_tx: watch::Sender<bool>,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        let (connections_tx, _) = watch::channel(0);
        let (shutting_down_tx, _) = watch::channel(false);
        Self {
            inner: Mutex::new(LifecycleState {
                shutting_down: false,
                phase: Phase::Running,
                connections: HashMap::new(),
                queue: RestartQueue::new(),
            }),
            connections_tx,
            shutting_down_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LifecycleState> {
        // Every critical section leaves the state consistent, so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    pub(crate) fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Flip `shutting_down` and enter `phase`. Returns false if shutdown had already begun.
    pub(crate) fn begin_shutdown(&self, phase: Phase) -> bool {
        {
            let mut state = self.lock();
            if state.shutting_down {
                return false;
            }
            state.shutting_down = true;
            state.phase = phase;
        }
        self.shutting_down_tx.send_replace(true);
        true
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        self.lock().phase = phase;
    }

    pub(crate) fn subscribe_shutting_down(&self) -> watch::Receiver<bool> {
        self.shutting_down_tx.subscribe()
    }

    /// Add a connection unless shutdown has begun.
    pub(crate) fn insert_connection(
        &self,
        id: ConnectionId,
        handle: Arc<dyn ConnectionHandle>,
    ) -> Result<(), LifecycleError> {
        let count = {
            let mut state = self.lock();
            if state.shutting_down {
                return Err(LifecycleError::ShuttingDown);
            }
            state.connections.insert(id, handle);
            state.connections.len()
        };
        self.publish_connections(count);
        Ok(())
    }

    pub(crate) fn remove_connection(&self, id: ConnectionId) -> bool {
        let (removed, count) = {
            let mut state = self.lock();
            let removed = state.connections.remove(&id).is_some();
            (removed, state.connections.len())
        };
        if removed {
            self.publish_connections(count);
        }
        removed
    }

    /// Remove every connection so the caller can force-terminate them.
    pub(crate) fn take_connections(&self) -> Vec<(ConnectionId, Arc<dyn ConnectionHandle>)> {
        let taken: Vec<_> = self.lock().connections.drain().collect();
        if !taken.is_empty() {
            self.publish_connections(0);
        }
        taken
    }

    pub(crate) fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    pub(crate) fn subscribe_connections(&self) -> watch::Receiver<usize> {
        self.connections_tx.subscribe()
    }

    fn publish_connections(&self, count: usize) {
        self.connections_tx.send_replace(count);
        metrics::set_active_connections(count);
    }

    /// Queue a request unless shutdown has begun.
    pub(crate) fn enqueue(&self, request: RestartRequest) -> Result<usize, LifecycleError> {
        let mut state = self.lock();
        if state.shutting_down {
            return Err(LifecycleError::ShuttingDown);
        }
        state.queue.push(request);
        let len = state.queue.len();
        metrics::set_queue_length(len);
        Ok(len)
    }

    /// Put back a request that was popped but not dispatched.
    pub(crate) fn requeue(&self, request: RestartRequest) {
        let mut state = self.lock();
        state.queue.push(request);
        metrics::set_queue_length(state.queue.len());
    }

    pub(crate) fn pop_restart(&self) -> Option<RestartRequest> {
        let mut state = self.lock();
        let request = state.queue.pop();
        metrics::set_queue_length(state.queue.len());
        request
    }

    pub(crate) fn peek_priority(&self) -> Option<Priority> {
        self.lock().queue.peek_priority()
    }

    pub(crate) fn drain_queue(&self) -> Vec<RestartRequest> {
        let drained = self.lock().queue.drain_ordered();
        metrics::set_queue_length(0);
        drained
    }

    /// Read everything the snapshot needs under a single lock acquisition.
    pub(crate) fn read(&self) -> (bool, Phase, usize, usize) {
        let state = self.lock();
        (
            state.shutting_down,
            state.phase,
            state.connections.len(),
            state.queue.len(),
        )
    }
}

/// Read-only diagnostics view of the lifecycle manager.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleSnapshot {
    pub shutting_down: bool,
    pub phase: Phase,
    pub active_connections: usize,
    pub queue_length: usize,
    pub uptime_secs: u64,
    pub memory: MemoryUsage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::error::ConnectionError;
    use crate::lifecycle::request::{Metadata, RestartReason};

    #[derive(Debug)]
    struct Idle;

    impl ConnectionHandle for Idle {
        fn force_close(&self) -> Result<(), ConnectionError> {
            Ok(())
        }
    }

    #[test]
    fn shutdown_flag_flips_once() {
        let state = SharedState::new();
        assert!(state.begin_shutdown(Phase::Draining));
        assert!(!state.begin_shutdown(Phase::Draining));
        assert!(state.is_shutting_down());
        assert_eq!(state.phase(), Phase::Draining);
    }

    #[test]
    fn refuses_connections_after_shutdown() {
        let state = SharedState::new();
        state.insert_connection(ConnectionId::new(), Arc::new(Idle)).unwrap();
        state.begin_shutdown(Phase::Draining);

        let result = state.insert_connection(ConnectionId::new(), Arc::new(Idle));
        assert!(matches!(result, Err(LifecycleError::ShuttingDown)));
        assert_eq!(state.connection_count(), 1);
    }

    #[test]
    fn connection_count_is_published() {
        let state = SharedState::new();
        let rx = state.subscribe_connections();
        let id = ConnectionId::new();

        state.insert_connection(id, Arc::new(Idle)).unwrap();
        assert_eq!(*rx.borrow(), 1);

        assert!(state.remove_connection(id));
        assert!(!state.remove_connection(id));
        assert_eq!(*rx.borrow(), 0);
    }

    #[test]
    fn refuses_requests_after_shutdown() {
        let state = SharedState::new();
        state.begin_shutdown(Phase::Draining);
        let request = RestartRequest::new(RestartReason::ManualRestart, Metadata::new());
        assert!(matches!(state.enqueue(request), Err(LifecycleError::ShuttingDown)));
    }
}
