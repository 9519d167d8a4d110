//! The lifecycle manager.
//!
//! Owns the shutdown flag, connection registry, restart queue and background
//! tasks of one process. Construct it once in `main` and hand out clones;
//! every clone refers to the same state.
//!
//! # Control Loop
//! ```text
//! signals ─┐
//! faults  ─┼─→ events channel ─→ run() ─→ graceful / restart / emergency sequence
//! queue   ─┘                       │
//!                                  └─ dispatch: pop highest priority request,
//!                                     hold Low for the grace window
//! ```

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{HealthConfig, LifecycleConfig, ScheduleConfig};
use crate::health::probe::MemoryProbe;
use crate::health::sampler::HealthSampler;
use crate::health::schedule::RestartSchedule;
use crate::lifecycle::error::LifecycleError;
use crate::lifecycle::exit::{ProcessExit, Termination, TerminationKind};
use crate::lifecycle::fault::{self, Fault};
use crate::lifecycle::request::{Metadata, Priority, RestartReason, RestartRequest};
use crate::lifecycle::resource::ManagedResource;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::{Signal, SignalAction};
use crate::lifecycle::state::{LifecycleSnapshot, Phase, SharedState};
use crate::net::connection::ConnectionRegistry;
use crate::observability::metrics;

/// Input to the control loop.
#[derive(Debug)]
pub enum LifecycleEvent {
    Signal(Signal),
    Fault(Fault),
    /// A restart request was queued; wake up and dispatch.
    RestartQueued,
}

/// Why the control loop woke up.
enum Wake {
    Event(Option<LifecycleEvent>),
    HoldElapsed,
    ShutdownBegun,
}

/// A low-priority request waiting out its grace window.
struct Held {
    request: RestartRequest,
    deadline: Instant,
}

struct Inner {
    shared: Arc<SharedState>,
    config: LifecycleConfig,
    resources: Mutex<Vec<Arc<dyn ManagedResource>>>,
    background: Shutdown,
    /// Background tasks termination waits for, so their sockets are released before exit.
    tasks: Mutex<Vec<JoinHandle<()>>>,
    events_tx: mpsc::UnboundedSender<LifecycleEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<LifecycleEvent>>>,
    terminated_tx: watch::Sender<Option<Termination>>,
    probe: Arc<dyn MemoryProbe>,
    exit: Arc<dyn ProcessExit>,
    started_at: Instant,
}

/// Handle to the process lifecycle. Cheap to clone.
#[derive(Clone)]
pub struct LifecycleManager {
    inner: Arc<Inner>,
}

impl LifecycleManager {
    pub fn new(
        config: LifecycleConfig,
        probe: Arc<dyn MemoryProbe>,
        exit: Arc<dyn ProcessExit>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (terminated_tx, _) = watch::channel(None);

        Self {
            inner: Arc::new(Inner {
                shared: Arc::new(SharedState::new()),
                config,
                resources: Mutex::new(Vec::new()),
                background: Shutdown::new(),
                tasks: Mutex::new(Vec::new()),
                events_tx,
                events_rx: Mutex::new(Some(events_rx)),
                terminated_tx,
                probe,
                exit,
                started_at: Instant::now(),
            }),
        }
    }

    /// Registry the network layer uses to report connections.
    pub fn registry(&self) -> ConnectionRegistry {
        ConnectionRegistry::new(Arc::clone(&self.inner.shared))
    }

    /// Sender for signal listeners and fault reporters.
    pub fn events(&self) -> mpsc::UnboundedSender<LifecycleEvent> {
        self.inner.events_tx.clone()
    }

    /// Coordinator that stops background tasks at the end of a sequence.
    pub fn background(&self) -> &Shutdown {
        &self.inner.background
    }

    /// Add a resource to close during `Closing`. Closed in registration order.
    pub fn register_resource(&self, resource: Arc<dyn ManagedResource>) {
        tracing::debug!(resource = resource.name(), "Resource registered");
        self.inner
            .resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(resource);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shared.is_shutting_down()
    }

    pub fn phase(&self) -> Phase {
        self.inner.shared.phase()
    }

    pub fn uptime(&self) -> Duration {
        self.inner.started_at.elapsed()
    }

    /// Consistent point-in-time view. Never waits on a running drain.
    pub fn snapshot(&self) -> LifecycleSnapshot {
        let (shutting_down, phase, active_connections, queue_length) = self.inner.shared.read();
        LifecycleSnapshot {
            shutting_down,
            phase,
            active_connections,
            queue_length,
            uptime_secs: self.uptime().as_secs(),
            memory: self.inner.probe.sample(),
        }
    }

    /// Queue a restart through the normal priority path.
    pub fn request_restart(
        &self,
        reason: RestartReason,
        metadata: Metadata,
    ) -> Result<RestartRequest, LifecycleError> {
        let request = RestartRequest::new(reason, metadata);
        let queue_length = self.inner.shared.enqueue(request.clone())?;

        tracing::info!(
            request_id = %request.id,
            reason = %request.reason,
            priority = %request.priority,
            metadata = ?request.metadata,
            queue_length,
            "Restart request queued"
        );
        metrics::record_restart_requested(&request.reason, request.priority);

        self.inner
            .events_tx
            .send(LifecycleEvent::RestartQueued)
            .map_err(|_| LifecycleError::ChannelClosed)?;
        Ok(request)
    }

    /// Operator-initiated restart. Same queue, same ordering, no bypass.
    pub fn trigger_manual_restart(&self, metadata: Metadata) -> Result<RestartRequest, LifecycleError> {
        self.request_restart(RestartReason::ManualRestart, metadata)
    }

    /// Start the periodic health sampler. It stops when the sequence ends.
    pub fn spawn_health_sampler(&self, config: HealthConfig, probe: Arc<dyn MemoryProbe>) {
        let sampler = HealthSampler::new(self.clone(), probe, config);
        let stop = self.inner.background.subscribe();
        self.spawn_background(sampler.run(stop));
    }

    /// Start the scheduled restart timer, if one is configured. Returns the jittered delay.
    pub fn spawn_restart_schedule(&self, config: &ScheduleConfig) -> Option<Duration> {
        let schedule = RestartSchedule::from_config(self.clone(), config)?;
        let delay = schedule.delay();
        let stop = self.inner.background.subscribe();
        self.spawn_background(schedule.run(stop));
        Some(delay)
    }

    /// Spawn a task whose failure or panic triggers an emergency shutdown.
    pub fn spawn_supervised<F, E>(&self, name: &str, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        self.track(fault::spawn_supervised(self.events(), name, task));
    }

    /// Spawn a task that must finish (or be aborted) before the process exits.
    ///
    /// The task should stop when [`background`](Self::background) is triggered.
    pub fn spawn_background<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.track(tokio::spawn(task));
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Wait until some sequence has reached `Terminated`.
    pub async fn terminated(&self) -> Termination {
        let mut rx = self.inner.terminated_tx.subscribe();
        loop {
            if let Some(termination) = rx.borrow_and_update().clone() {
                return termination;
            }
            // The sender lives in `inner`, which `self` keeps alive.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Run the control loop until the process terminates.
    ///
    /// Only one loop may run per manager.
    pub async fn run(&self) -> Result<Termination, LifecycleError> {
        let mut events = self
            .inner
            .events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(LifecycleError::AlreadyRunning)?;
        let mut shutting_down = self.inner.shared.subscribe_shutting_down();
        let mut held: Option<Held> = None;

        tracing::info!("Lifecycle manager running");

        loop {
            if let Some(request) = self.next_dispatch(&mut held) {
                let restart = self.restart_for(request);
                if let Some(termination) = self.while_listening(restart, &mut events).await {
                    return Ok(termination);
                }
            }

            let hold_deadline = held.as_ref().map(|h| h.deadline);

            let wake = tokio::select! {
                event = events.recv() => Wake::Event(event),
                _ = sleep_until_opt(hold_deadline), if hold_deadline.is_some() => Wake::HoldElapsed,
                _ = shutdown_begun(&mut shutting_down) => Wake::ShutdownBegun,
            };

            let termination = match wake {
                Wake::Event(Some(LifecycleEvent::Signal(signal))) => {
                    self.while_listening(self.handle_signal(signal), &mut events).await
                }
                Wake::Event(Some(LifecycleEvent::Fault(fault))) => {
                    self.while_listening(self.emergency_shutdown(fault), &mut events).await
                }
                Wake::Event(Some(LifecycleEvent::RestartQueued)) => None,
                Wake::Event(None) => return Err(LifecycleError::ChannelClosed),
                Wake::HoldElapsed => match held.take() {
                    Some(Held { request, .. }) => {
                        tracing::info!(
                            request_id = %request.id,
                            reason = %request.reason,
                            "Grace window elapsed, dispatching low-priority restart"
                        );
                        self.while_listening(self.restart_for(request), &mut events).await
                    }
                    None => None,
                },
                Wake::ShutdownBegun => {
                    // A sequence started outside this loop; follow it to the end.
                    Some(self.while_listening(self.terminated(), &mut events).await)
                }
            };

            if let Some(termination) = termination {
                return Ok(termination);
            }
        }
    }

    /// Drive `sequence` to completion while still consuming events.
    ///
    /// Every trigger that arrives meanwhile goes through its normal handler,
    /// which finds shutdown already begun and logs it as ignored.
    async fn while_listening<F: Future>(
        &self,
        sequence: F,
        events: &mut mpsc::UnboundedReceiver<LifecycleEvent>,
    ) -> F::Output {
        tokio::pin!(sequence);
        loop {
            tokio::select! {
                // The sequence claims the shutdown flag on its first poll.
                biased;
                output = &mut sequence => return output,
                Some(event) = events.recv() => match event {
                    LifecycleEvent::Signal(signal) => {
                        self.handle_signal(signal).await;
                    }
                    LifecycleEvent::Fault(fault) => {
                        self.emergency_shutdown(fault).await;
                    }
                    LifecycleEvent::RestartQueued => {}
                },
            }
        }
    }

    /// Pick the next request to dispatch, if any.
    fn next_dispatch(&self, held: &mut Option<Held>) -> Option<RestartRequest> {
        let shared = &self.inner.shared;
        if shared.is_shutting_down() {
            return None;
        }
        let head = shared.peek_priority()?;

        if let Some(current) = held.as_ref() {
            if head <= Priority::Low {
                return None;
            }
            tracing::info!(
                request_id = %current.request.id,
                preempted_by = %head,
                "Higher-priority restart pre-empts held request"
            );
            if let Some(current) = held.take() {
                shared.requeue(current.request);
            }
        }

        let request = shared.pop_restart()?;
        tracing::info!(
            request_id = %request.id,
            reason = %request.reason,
            priority = %request.priority,
            "Restart request dequeued"
        );

        if request.priority == Priority::Low {
            let grace = Duration::from_secs(self.inner.config.low_priority_grace_secs);
            tracing::info!(
                request_id = %request.id,
                grace_secs = grace.as_secs(),
                "Holding low-priority restart for grace window"
            );
            *held = Some(Held {
                request,
                deadline: Instant::now() + grace,
            });
            return None;
        }

        Some(request)
    }

    async fn restart_for(&self, request: RestartRequest) -> Option<Termination> {
        tracing::info!(
            request_id = %request.id,
            reason = %request.reason,
            priority = %request.priority,
            "Dispatching restart"
        );
        let trigger = request.reason.to_string();
        self.run_sequence(TerminationKind::Restart, trigger, Some(request.reason))
            .await
    }

    async fn handle_signal(&self, signal: Signal) -> Option<Termination> {
        match signal.action() {
            SignalAction::Shutdown => self.graceful_shutdown(signal.name()).await,
            SignalAction::Restart => {
                let reason = match signal {
                    Signal::Reload => RestartReason::ConfigurationReload,
                    _ => RestartReason::ManualRestart,
                };
                self.graceful_restart(signal.name(), reason).await
            }
        }
    }

    /// Drain, close resources and exit. Returns `None` if a sequence was already running.
    pub async fn graceful_shutdown(&self, trigger: &str) -> Option<Termination> {
        self.run_sequence(TerminationKind::Shutdown, trigger.to_string(), None)
            .await
    }

    /// Same as [`graceful_shutdown`](Self::graceful_shutdown) but the process is relaunched.
    pub async fn graceful_restart(&self, trigger: &str, reason: RestartReason) -> Option<Termination> {
        self.run_sequence(TerminationKind::Restart, trigger.to_string(), Some(reason))
            .await
    }

    async fn run_sequence(
        &self,
        kind: TerminationKind,
        trigger: String,
        reason: Option<RestartReason>,
    ) -> Option<Termination> {
        let shared = &self.inner.shared;
        if !shared.begin_shutdown(Phase::Draining) {
            tracing::warn!(trigger = %trigger, "Shutdown already in progress, ignoring trigger");
            metrics::record_ignored_trigger(&trigger);
            return None;
        }
        tracing::info!(trigger = %trigger, kind = ?kind, "Running → Draining");

        let drain_started = Instant::now();
        let forced_closures = self.drain().await;
        let drain_duration = drain_started.elapsed();

        shared.set_phase(Phase::Closing);
        tracing::info!(
            drain_ms = drain_duration.as_millis() as u64,
            forced_closures,
            "Draining → Closing"
        );
        let clean = self.close_resources().await;

        Some(self.terminate(Termination {
            kind,
            trigger,
            reason,
            exit_code: if clean { 0 } else { 1 },
            forced_closures,
            drain_duration,
            discarded_requests: 0,
        })
        .await)
    }

    /// Wait for connections to finish, force-closing leftovers at the deadline.
    /// Returns the number of forced closures.
    async fn drain(&self) -> usize {
        let shared = &self.inner.shared;
        let timeout = Duration::from_secs(self.inner.config.drain_timeout_secs);
        let poll = Duration::from_millis(self.inner.config.drain_poll_interval_ms.max(1));
        let deadline = Instant::now() + timeout;
        let mut count_rx = shared.subscribe_connections();

        tracing::info!(
            connections = shared.connection_count(),
            timeout_secs = timeout.as_secs(),
            "Draining connections"
        );

        loop {
            let remaining = shared.connection_count();
            if remaining == 0 {
                tracing::info!("All connections drained");
                return 0;
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(remaining, "Drain timeout elapsed");
                break;
            }

            tokio::select! {
                Ok(()) = count_rx.changed() => {}
                _ = tokio::time::sleep_until((now + poll).min(deadline)) => {
                    tracing::debug!(remaining, "Waiting for connections to drain");
                }
            }
        }

        self.force_close_all("drain timeout")
    }

    /// Force-terminate every registered connection, each in isolation.
    fn force_close_all(&self, cause: &str) -> usize {
        let mut closed = 0;
        for (id, handle) in self.inner.shared.take_connections() {
            let peer = handle.describe();
            match panic::catch_unwind(AssertUnwindSafe(|| handle.force_close())) {
                Ok(Ok(())) => {
                    tracing::warn!(connection_id = %id, peer = %peer, cause, "Connection forcibly closed");
                    metrics::record_forced_closure();
                    closed += 1;
                }
                Ok(Err(e)) => {
                    tracing::error!(connection_id = %id, peer = %peer, error = %e, "Failed to force-close connection");
                }
                Err(_) => {
                    tracing::error!(connection_id = %id, peer = %peer, "Force-close panicked");
                }
            }
        }
        closed
    }

    /// Close resources one at a time. Returns false if any close failed unrecoverably.
    async fn close_resources(&self) -> bool {
        let resources = self
            .inner
            .resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let timeout = Duration::from_secs(self.inner.config.resource_close_timeout_secs);
        let mut clean = true;

        for resource in resources {
            let name = resource.name().to_string();
            let mut task = tokio::spawn(async move { resource.close().await });

            match tokio::time::timeout(timeout, &mut task).await {
                Ok(Ok(Ok(()))) => {
                    tracing::info!(resource = %name, "Resource closed");
                }
                Ok(Ok(Err(e))) => {
                    tracing::warn!(resource = %name, error = %e, "Resource failed to close, continuing");
                    metrics::record_resource_close_failure(&name);
                }
                Ok(Err(e)) => {
                    tracing::error!(resource = %name, error = %e, "Resource close aborted");
                    metrics::record_resource_close_failure(&name);
                    clean = false;
                }
                Err(_) => {
                    task.abort();
                    tracing::error!(
                        resource = %name,
                        timeout_secs = timeout.as_secs(),
                        "Resource close timed out"
                    );
                    metrics::record_resource_close_failure(&name);
                    clean = false;
                }
            }
        }

        clean
    }

    /// Skip draining: force-close everything and exit with code 1.
    ///
    /// Returns `None` if a sequence was already running.
    pub async fn emergency_shutdown(&self, fault: Fault) -> Option<Termination> {
        if !self.inner.shared.begin_shutdown(Phase::Closing) {
            tracing::error!(fault = %fault, "Fault during shutdown already in progress, ignoring");
            metrics::record_ignored_trigger("fault");
            return None;
        }
        tracing::error!(fault = %fault, "Emergency shutdown, skipping drain");

        let forced_closures = self.force_close_all("emergency");

        Some(self.terminate(Termination {
            kind: TerminationKind::Emergency,
            trigger: fault.to_string(),
            reason: None,
            exit_code: 1,
            forced_closures,
            drain_duration: Duration::ZERO,
            discarded_requests: 0,
        })
        .await)
    }

    /// Stop background tasks and wait for them, bounded by the resource close timeout.
    async fn stop_background(&self) {
        self.inner.background.trigger();

        let tasks = {
            let mut tasks = self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *tasks)
        };
        let timeout = Duration::from_secs(self.inner.config.resource_close_timeout_secs);
        let deadline = Instant::now() + timeout;

        for task in tasks {
            let abort = task.abort_handle();
            if tokio::time::timeout_at(deadline, task).await.is_err() {
                abort.abort();
                tracing::warn!("Background task did not stop in time, aborted");
            }
        }
    }

    async fn terminate(&self, mut termination: Termination) -> Termination {
        self.stop_background().await;

        let discarded = self.inner.shared.drain_queue();
        for request in &discarded {
            tracing::info!(
                request_id = %request.id,
                reason = %request.reason,
                priority = %request.priority,
                "Restart request discarded, process terminating"
            );
        }
        termination.discarded_requests = discarded.len();

        self.inner.shared.set_phase(Phase::Terminated);
        tracing::info!(
            kind = ?termination.kind,
            trigger = %termination.trigger,
            exit_code = termination.exit_code,
            forced_closures = termination.forced_closures,
            "Closing → Terminated"
        );

        self.inner.terminated_tx.send_replace(Some(termination.clone()));
        self.inner.exit.exit(&termination);
        termination
    }
}

async fn shutdown_begun(rx: &mut watch::Receiver<bool>) {
    // The sender lives in the shared state, so this only returns once the flag is set.
    let _ = rx.wait_for(|shutting_down| *shutting_down).await;
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
