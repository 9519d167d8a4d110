//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (register with lifecycle state)
//!     → echo service until EOF or forced termination
//!
//! On shutdown:
//!     listener stops accepting → registry refuses new entries
//!     → guards drop as connections finish → drain waiter wakes
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - Registration and the shutdown flag share one lock, so no connection
//!   slips in after draining starts

pub mod connection;
pub mod listener;
