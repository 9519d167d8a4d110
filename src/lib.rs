//! Process lifecycle manager: graceful shutdown, draining and restart decisions.

pub mod admin;
pub mod config;
pub mod health;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::schema::AppConfig;
pub use lifecycle::LifecycleManager;
