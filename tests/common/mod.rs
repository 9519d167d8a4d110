//! Shared fakes for lifecycle integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lifecycle_manager::config::LifecycleConfig;
use lifecycle_manager::health::probe::{MemoryProbe, MemoryUsage};
use lifecycle_manager::lifecycle::error::{ConnectionError, ResourceError};
use lifecycle_manager::lifecycle::{
    LifecycleManager, ManagedResource, ProcessExit, Termination,
};
use lifecycle_manager::net::connection::{ConnectionGuard, ConnectionHandle, ConnectionRegistry};

/// Collects formatted log output for the current thread.
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Routes this thread's events here until the guard drops. Spawned tasks are
    /// covered because `#[tokio::test]` polls them on the test thread.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn lines_containing(&self, needle: &str) -> Vec<String> {
        let buffer = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buffer)
            .lines()
            .filter(|line| line.contains(needle))
            .map(str::to_string)
            .collect()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Records exit calls instead of exiting.
#[derive(Default)]
pub struct RecordingExit {
    calls: Mutex<Vec<Termination>>,
}

impl RecordingExit {
    pub fn calls(&self) -> Vec<Termination> {
        self.calls.lock().unwrap().clone()
    }
}

impl ProcessExit for RecordingExit {
    fn exit(&self, termination: &Termination) {
        self.calls.lock().unwrap().push(termination.clone());
    }
}

/// Memory probe returning whatever the test sets.
pub struct StaticProbe {
    usage: Mutex<MemoryUsage>,
}

impl StaticProbe {
    pub fn new(used_bytes: u64, total_bytes: u64) -> Self {
        Self {
            usage: Mutex::new(MemoryUsage {
                used_bytes,
                total_bytes,
            }),
        }
    }

    pub fn set(&self, used_bytes: u64, total_bytes: u64) {
        *self.usage.lock().unwrap() = MemoryUsage {
            used_bytes,
            total_bytes,
        };
    }
}

impl MemoryProbe for StaticProbe {
    fn sample(&self) -> MemoryUsage {
        *self.usage.lock().unwrap()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Ok,
    Fail,
    Panic,
    Hang,
}

/// Connection whose force-close is counted and can be made to fail.
pub struct MockConnection {
    behavior: Behavior,
    force_closed: AtomicUsize,
}

impl MockConnection {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            force_closed: AtomicUsize::new(0),
        })
    }

    pub fn force_closed(&self) -> usize {
        self.force_closed.load(Ordering::SeqCst)
    }
}

impl ConnectionHandle for MockConnection {
    fn force_close(&self) -> Result<(), ConnectionError> {
        self.force_closed.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Ok | Behavior::Hang => Ok(()),
            Behavior::Fail => Err(ConnectionError::AlreadyClosed),
            Behavior::Panic => panic!("force close exploded"),
        }
    }
}

/// Resource that records close attempts into a shared log.
pub struct MockResource {
    name: String,
    behavior: Behavior,
    log: Arc<Mutex<Vec<String>>>,
}

impl MockResource {
    pub fn new(name: &str, behavior: Behavior, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior,
            log: Arc::clone(log),
        })
    }
}

#[async_trait]
impl ManagedResource for MockResource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn close(&self) -> Result<(), ResourceError> {
        self.log.lock().unwrap().push(self.name.clone());
        match self.behavior {
            Behavior::Ok => Ok(()),
            Behavior::Fail => Err(ResourceError::Failed(format!("{} refused to close", self.name))),
            Behavior::Panic => panic!("{} close exploded", self.name),
            Behavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

pub fn lifecycle_config() -> LifecycleConfig {
    LifecycleConfig {
        drain_timeout_secs: 30,
        drain_poll_interval_ms: 1000,
        low_priority_grace_secs: 5,
        resource_close_timeout_secs: 10,
        ..Default::default()
    }
}

pub struct Harness {
    pub manager: LifecycleManager,
    pub exit: Arc<RecordingExit>,
    pub probe: Arc<StaticProbe>,
}

pub fn harness() -> Harness {
    harness_with(lifecycle_config())
}

pub fn harness_with(config: LifecycleConfig) -> Harness {
    let exit = Arc::new(RecordingExit::default());
    let probe = Arc::new(StaticProbe::new(100, 1000));
    let manager = LifecycleManager::new(config, probe.clone(), exit.clone());
    Harness {
        manager,
        exit,
        probe,
    }
}

/// Register `count` connections that stay open until their guards drop.
pub fn open_connections(
    registry: &ConnectionRegistry,
    count: usize,
) -> (Vec<Arc<MockConnection>>, Vec<ConnectionGuard>) {
    let mut connections = Vec::with_capacity(count);
    let mut guards = Vec::with_capacity(count);
    for _ in 0..count {
        let connection = MockConnection::new(Behavior::Ok);
        guards.push(registry.register(connection.clone()).unwrap());
        connections.push(connection);
    }
    (connections, guards)
}

/// Drop each guard after `after`, simulating connections finishing their work.
pub fn close_after(guards: Vec<ConnectionGuard>, after: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        drop(guards);
    });
}
