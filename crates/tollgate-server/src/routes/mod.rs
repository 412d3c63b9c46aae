//! HTTP routes.

use axum::Router;
use axum::body::Bytes;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::routing::{get, post, put};
use serde::de::DeserializeOwned;
use tower_http::trace::TraceLayer;

use crate::auth::{ADMIN_ROLE, TokenClaims};
use crate::error::ServerError;
use crate::state::AppState;

pub mod admin;
pub mod signup;

/// Builds the API router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/signup", post(signup::create).get(signup::status))
        .route("/signup/verification", put(signup::request_code))
        .route("/signup/verification/activation-code", post(signup::redeem))
        .route("/signup/verification/{code}", get(signup::check_code))
        .route("/admin/signups/{key}/approve", post(admin::approve))
        .route("/admin/signups/{key}/deactivate", post(admin::deactivate))
        .route("/admin/signups/{key}/provisioned", post(admin::provisioned))
        .route("/admin/events", post(admin::create_event))
        .route("/admin/events/{code}", get(admin::get_event));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Extractors
// ============================================================================

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct Caller(pub TokenClaims);

impl FromRequestParts<AppState> for Caller {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        Ok(Caller(state.auth.authenticate(header)?))
    }
}

/// An authenticated caller holding the admin role.
#[derive(Debug, Clone)]
pub struct Admin(pub TokenClaims);

impl FromRequestParts<AppState> for Admin {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Caller(claims) = Caller::from_request_parts(parts, state).await?;
        if !claims.has_role(ADMIN_ROLE) {
            tracing::warn!(sub = %claims.sub, "admin route refused");
            return Err(ServerError::MissingRole { role: ADMIN_ROLE });
        }
        Ok(Admin(claims))
    }
}

/// Parses a JSON body; an empty body yields the default value.
pub(crate) fn json_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ServerError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|err| ServerError::BadRequest(format!("malformed request body: {err}")))
}
