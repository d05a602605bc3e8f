use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::control::ControlState;
use crate::reload::{ReloadOutcome, ReloadRequest, ReloadStatsSnapshot, ReloadTrigger};
use crate::supervisor::{Role, RoleSnapshot, SupervisionState};

#[derive(Debug, Serialize)]
pub struct ManagerStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub roles: Vec<RoleSnapshot>,
    pub reloads: ReloadStatsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct ConfigureResponse {
    /// Whether the payload differed from the current file.
    pub changed: bool,
    pub fingerprint: String,
    /// Present when a reload was attempted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reload: Option<ReloadOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reload_error: Option<String>,
    pub status: ManagerStatus,
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("configuration payload is empty")]
    EmptyPayload,

    #[error("failed to write configuration: {0}")]
    Write(#[from] std::io::Error),
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = match self {
            ControlError::EmptyPayload => StatusCode::BAD_REQUEST,
            ControlError::Write(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

pub(crate) fn manager_status(state: &ControlState) -> ManagerStatus {
    let roles: Vec<RoleSnapshot> = state.roles.iter().map(|r| r.snapshot()).collect();

    let status = if state.shutdown.is_cancelled() {
        "shutting_down"
    } else if roles.iter().all(|r| r.state == SupervisionState::Running) {
        "operational"
    } else {
        "degraded"
    };

    ManagerStatus {
        version: env!("CARGO_PKG_VERSION"),
        status,
        roles,
        reloads: state.coordinator.stats(),
    }
}

pub async fn get_status(State(state): State<ControlState>) -> Json<ManagerStatus> {
    Json(manager_status(&state))
}

/// Write the payload as the new load balancer configuration and, if it
/// changed anything, signal the load balancer to reload.
///
/// Returns once the signal is dispatched, not once the reload finished.
pub async fn configure(
    State(state): State<ControlState>,
    payload: Bytes,
) -> Result<Json<ConfigureResponse>, ControlError> {
    if payload.is_empty() {
        return Err(ControlError::EmptyPayload);
    }

    let outcome = state.writer.apply(&payload).await?;
    let fingerprint = outcome.fingerprint();

    let (reload, reload_error) = if outcome.changed() {
        let request = ReloadRequest::new(Role::LoadBalancer, ReloadTrigger::Configure { fingerprint });
        match state.coordinator.reload(&request).await {
            Ok(result) => (Some(result), None),
            Err(e) => {
                tracing::warn!(error = %e, "Reload after configure failed");
                (None, Some(e.to_string()))
            }
        }
    } else {
        tracing::debug!(fingerprint = %fingerprint, "Configure payload matches current file, skipping reload");
        (None, None)
    };

    Ok(Json(ConfigureResponse {
        changed: outcome.changed(),
        fingerprint: fingerprint.to_hex(),
        reload,
        reload_error,
        status: manager_status(&state),
    }))
}
