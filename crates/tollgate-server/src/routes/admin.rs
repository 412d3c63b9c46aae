//! Operator routes. Every handler requires the admin role.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use tollgate::{ActivationEvent, NewEvent, SignupKey};
use tracing::instrument;

use super::{Admin, json_body};
use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    #[serde(default)]
    pub target_cluster: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedRequest {
    #[serde(default)]
    pub compliant_username: String,
}

#[instrument(skip_all, fields(admin = %admin.0.sub, key = %key))]
pub async fn approve(
    State(state): State<AppState>,
    admin: Admin,
    Path(key): Path<String>,
    body: Bytes,
) -> ServerResult<StatusCode> {
    let request: ApproveRequest = json_body(&body)?;
    state
        .service
        .approve(&SignupKey::new(key), true, request.target_cluster)?;
    Ok(StatusCode::OK)
}

#[instrument(skip_all, fields(admin = %admin.0.sub, key = %key))]
pub async fn deactivate(
    State(state): State<AppState>,
    admin: Admin,
    Path(key): Path<String>,
) -> ServerResult<StatusCode> {
    state.service.deactivate(&SignupKey::new(key), true)?;
    Ok(StatusCode::OK)
}

#[instrument(skip_all, fields(admin = %admin.0.sub, key = %key))]
pub async fn provisioned(
    State(state): State<AppState>,
    admin: Admin,
    Path(key): Path<String>,
    body: Bytes,
) -> ServerResult<StatusCode> {
    let request: ProvisionedRequest = json_body(&body)?;
    state
        .service
        .mark_provisioned(&SignupKey::new(key), &request.compliant_username)?;
    Ok(StatusCode::OK)
}

#[instrument(skip_all, fields(admin = %admin.0.sub))]
pub async fn create_event(
    State(state): State<AppState>,
    admin: Admin,
    body: Bytes,
) -> ServerResult<(StatusCode, Json<ActivationEvent>)> {
    let request: NewEvent = serde_json::from_slice(&body)
        .map_err(|err| ServerError::BadRequest(format!("malformed request body: {err}")))?;
    let event = state.service.create_event(request)?;
    Ok((StatusCode::CREATED, Json(event)))
}

#[instrument(skip_all, fields(admin = %admin.0.sub, event = %code))]
pub async fn get_event(
    State(state): State<AppState>,
    admin: Admin,
    Path(code): Path<String>,
) -> ServerResult<Json<ActivationEvent>> {
    Ok(Json(state.service.get_event(&code)?))
}
