//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Build manager → Install signals/panic hook
//!     → Start sampler, schedule, watcher, admin → Start listener
//!
//! Restart decisions (request.rs, queue.rs):
//!     Health sample / schedule / config change / operator
//!     → RestartRequest (priority from reason) → RestartQueue
//!
//! Shutdown (manager.rs):
//!     Running → Draining → Closing → Terminated
//!     Signal received → Stop accepting → Drain connections → Close resources → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → graceful shutdown
//!     SIGHUP/SIGUSR2 → graceful restart
//!
//! Faults (fault.rs):
//!     Panic / supervised task failure → emergency shutdown
//! ```
//!
//! # Design Decisions
//! - Exactly one sequence per process; later triggers are logged no-ops
//! - Drain has a timeout: leftovers are force-closed, never waited on forever
//! - Resource close failures are contained; only the exit code reports them

pub mod error;
pub mod exit;
pub mod fault;
pub mod manager;
pub mod queue;
pub mod request;
pub mod resource;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use error::LifecycleError;
pub use exit::{ProcessExit, ProcessTerminator, Termination, TerminationKind};
pub use manager::{LifecycleEvent, LifecycleManager};
pub use request::{Metadata, Priority, RestartReason, RestartRequest};
pub use resource::ManagedResource;
pub use shutdown::Shutdown;
pub use state::{LifecycleSnapshot, Phase};
