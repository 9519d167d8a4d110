//! Process termination.
//!
//! The shutdown sequence ends by handing a [`Termination`] to a
//! [`ProcessExit`]. In production that is [`ProcessTerminator`], which never
//! returns; tests substitute a recorder.

use std::process::Command;
use std::time::Duration;

use crate::config::RestartMode;
use crate::lifecycle::request::RestartReason;

/// Which sequence produced the termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationKind {
    /// Graceful shutdown, the process is not coming back.
    Shutdown,
    /// Graceful shutdown followed by a relaunch.
    Restart,
    /// Fault-triggered shutdown that skipped draining.
    Emergency,
}

/// Outcome of a completed shutdown sequence.
#[derive(Debug, Clone)]
pub struct Termination {
    pub kind: TerminationKind,
    /// Signal name, fault, or restart reason that started the sequence.
    pub trigger: String,
    /// Set when a restart request was dispatched.
    pub reason: Option<RestartReason>,
    /// 0 for a clean sequence, 1 if any step failed unrecoverably or on emergency.
    pub exit_code: i32,
    /// Connections terminated because they outlived the drain window.
    pub forced_closures: usize,
    pub drain_duration: Duration,
    /// Queued restart requests abandoned because the process is terminating.
    pub discarded_requests: usize,
}

/// Final step of every shutdown sequence.
pub trait ProcessExit: Send + Sync {
    fn exit(&self, termination: &Termination);
}

/// Exits the process, relaunching it first in respawn mode.
pub struct ProcessTerminator {
    mode: RestartMode,
}

impl ProcessTerminator {
    pub fn new(mode: RestartMode) -> Self {
        Self { mode }
    }

    /// Exit code to use, after relaunching if this is a respawn restart.
    fn prepare(&self, termination: &Termination) -> i32 {
        if termination.kind != TerminationKind::Restart || self.mode != RestartMode::Respawn {
            return termination.exit_code;
        }

        match respawn() {
            Ok(pid) => {
                tracing::info!(pid, "Replacement process started");
                termination.exit_code
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to start replacement process");
                1
            }
        }
    }
}

impl ProcessExit for ProcessTerminator {
    fn exit(&self, termination: &Termination) {
        let code = self.prepare(termination);
        tracing::info!(
            kind = ?termination.kind,
            exit_code = code,
            "Process exiting"
        );
        std::process::exit(code);
    }
}

/// Start a copy of the current executable with the same arguments.
fn respawn() -> Result<u32, std::io::Error> {
    let exe = std::env::current_exe()?;
    let child = Command::new(exe)
        .args(std::env::args_os().skip(1))
        .spawn()?;
    Ok(child.id())
}
