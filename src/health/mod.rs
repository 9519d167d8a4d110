//! Health-driven restart decisions.
//!
//! # Data Flow
//! ```text
//! Sampler (sampler.rs):
//!     Periodic timer
//!     → probe.rs (memory used / total)
//!     → connection registry count
//!     → threshold exceeded → restart request queued
//!
//! Schedule (schedule.rs):
//!     Uptime reached → scheduled_restart queued
//! ```
//!
//! # Design Decisions
//! - Sampler never restarts directly; it only queues
//! - Memory is measured against a configured limit when one is set

pub mod probe;
pub mod sampler;
pub mod schedule;
