use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::admin::AdminState;
use crate::lifecycle::error::LifecycleError;
use crate::lifecycle::request::{Metadata, RestartReason, RestartRequest};
use crate::lifecycle::state::LifecycleSnapshot;

/// Body of `POST /admin/restart`. Empty body means a plain manual restart.
/// Only `manual_restart` and `configuration_reload` are accepted; health
/// reasons are raised by the sampler alone.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RestartBody {
    pub reason: Option<String>,
    pub metadata: Metadata,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<LifecycleSnapshot> {
    Json(state.manager.snapshot())
}

pub async fn post_restart(
    State(state): State<AdminState>,
    body: Bytes,
) -> Result<(StatusCode, Json<RestartRequest>), (StatusCode, String)> {
    let body: RestartBody = if body.is_empty() {
        RestartBody::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    };

    let mut metadata = body.metadata;
    metadata.insert("source".into(), "admin-api".into());

    let reason = match body.reason.as_deref().map(RestartReason::parse) {
        None => RestartReason::ManualRestart,
        Some(reason @ (RestartReason::ManualRestart | RestartReason::ConfigurationReload)) => {
            reason
        }
        Some(other) => {
            return Err((
                StatusCode::BAD_REQUEST,
                format!(
                    "reason {other} cannot be requested over the admin API, \
                     use manual_restart or configuration_reload"
                ),
            ));
        }
    };

    match state.manager.request_restart(reason, metadata) {
        Ok(request) => Ok((StatusCode::ACCEPTED, Json(request))),
        Err(LifecycleError::ShuttingDown) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            LifecycleError::ShuttingDown.to_string(),
        )),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}
