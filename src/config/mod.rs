//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → shared via Arc<ArcSwap<AppConfig>>
//!
//! On file change (watch = true):
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap of the shared config
//!     → configuration_reload restart request queued
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; lifecycle settings change only via restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::AdminConfig;
pub use schema::AppConfig;
pub use schema::HealthConfig;
pub use schema::LifecycleConfig;
pub use schema::ListenerConfig;
pub use schema::ObservabilityConfig;
pub use schema::RestartMode;
pub use schema::ScheduleConfig;
