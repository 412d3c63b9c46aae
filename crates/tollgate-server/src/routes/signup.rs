//! Routes used by people signing up.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use tollgate::{SignupStatus, signup_key};
use tracing::instrument;

use super::{Caller, json_body};
use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PhoneRequest {
    #[serde(default)]
    pub country_code: String,
    #[serde(default)]
    pub phone_number: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivationCodeRequest {
    #[serde(default)]
    pub code: String,
}

/// `POST /signup`
#[instrument(skip_all, fields(sub = %caller.0.sub))]
pub async fn create(State(state): State<AppState>, caller: Caller) -> ServerResult<StatusCode> {
    state.service.intake(caller.0.identity())?;
    Ok(StatusCode::ACCEPTED)
}

/// `GET /signup`
#[instrument(skip_all, fields(sub = %claims.sub))]
pub async fn status(
    State(state): State<AppState>,
    Caller(claims): Caller,
) -> ServerResult<Json<SignupStatus>> {
    let key = signup_key(&claims.identity());
    Ok(Json(state.service.get_status(&key)?))
}

/// `PUT /signup/verification`
#[instrument(skip_all, fields(sub = %claims.sub))]
pub async fn request_code(
    State(state): State<AppState>,
    Caller(claims): Caller,
    body: Bytes,
) -> ServerResult<StatusCode> {
    let request: PhoneRequest = json_body(&body)?;
    if request.country_code.trim().is_empty() || request.phone_number.trim().is_empty() {
        return Err(ServerError::BadRequest(
            "country_code and phone_number are required".to_string(),
        ));
    }
    let key = signup_key(&claims.identity());
    state
        .service
        .request_code(&key, &request.country_code, &request.phone_number)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /signup/verification/{code}`
#[instrument(skip_all, fields(sub = %claims.sub))]
pub async fn check_code(
    State(state): State<AppState>,
    Caller(claims): Caller,
    Path(code): Path<String>,
) -> ServerResult<StatusCode> {
    let key = signup_key(&claims.identity());
    state.service.check_code(&key, &code)?;
    Ok(StatusCode::OK)
}

/// `POST /signup/verification/activation-code`
#[instrument(skip_all, fields(sub = %claims.sub))]
pub async fn redeem(
    State(state): State<AppState>,
    Caller(claims): Caller,
    body: Bytes,
) -> ServerResult<StatusCode> {
    let request: ActivationCodeRequest = json_body(&body)?;
    if request.code.trim().is_empty() {
        return Err(ServerError::BadRequest("code is required".to_string()));
    }
    let key = signup_key(&claims.identity());
    state.service.redeem(&key, &request.code)?;
    Ok(StatusCode::OK)
}
