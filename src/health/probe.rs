//! Process memory probing.

use std::sync::Mutex;

use serde::Serialize;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// One memory observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MemoryUsage {
    /// Bytes in use by this process.
    pub used_bytes: u64,
    /// Bytes available to this process (limit or physical memory).
    pub total_bytes: u64,
}

impl MemoryUsage {
    /// Used-to-total ratio; zero when the total is unknown.
    pub fn ratio(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.total_bytes as f64
    }
}

/// Source of memory observations.
pub trait MemoryProbe: Send + Sync {
    fn sample(&self) -> MemoryUsage;
}

/// Reads resident memory of the current process via `sysinfo`.
pub struct SysinfoProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
    limit_bytes: Option<u64>,
}

impl SysinfoProbe {
    /// `limit_bytes` overrides physical memory as the denominator (e.g. a container limit).
    pub fn new(limit_bytes: Option<u64>) -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!(error = %e, "Cannot resolve own pid, memory sampling disabled");
                None
            }
        };

        Self {
            system: Mutex::new(System::new()),
            pid,
            limit_bytes,
        }
    }
}

impl MemoryProbe for SysinfoProbe {
    fn sample(&self) -> MemoryUsage {
        let Some(pid) = self.pid else {
            return MemoryUsage::default();
        };

        let mut system = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let used_bytes = system.process(pid).map(|p| p.memory()).unwrap_or(0);

        let total_bytes = match self.limit_bytes {
            Some(limit) => limit,
            None => {
                system.refresh_memory();
                system.total_memory()
            }
        };

        MemoryUsage {
            used_bytes,
            total_bytes,
        }
    }
}
