//! Admin diagnostics surface.
//!
//! - `GET  /admin/status`  lifecycle snapshot
//! - `POST /admin/restart` queue a `manual_restart` or `configuration_reload` request
//!
//! Both routes require `Authorization: Bearer <api_key>`. The server keeps
//! answering while connections drain and stops with the other background tasks.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::lifecycle::manager::LifecycleManager;

use self::auth::admin_auth_middleware;
use self::handlers::*;

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub manager: LifecycleManager,
    /// Live config; the API key is read from here on every request.
    pub config: Arc<ArcSwap<AppConfig>>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/restart", post(post_restart))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API until background tasks are stopped.
pub async fn serve(
    listener: TcpListener,
    state: AdminState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API starting");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!("Admin API stopped");
    Ok(())
}
