//! # tollgate-server: HTTP API for Tollgate
//!
//! Exposes the signup service over JSON/HTTP with [`axum`]. All routes live
//! under `/api/v1` and require a bearer JWT; the `/admin` routes additionally
//! require the `admin` role.
//!
//! | Method | Path | Success |
//! |---|---|---|
//! | POST | /signup | 202 |
//! | GET | /signup | 200 status body |
//! | PUT | /signup/verification | 204 |
//! | GET | /signup/verification/{code} | 200 |
//! | POST | /signup/verification/activation-code | 200 |
//! | POST | /admin/signups/{key}/approve | 200 |
//! | POST | /admin/signups/{key}/deactivate | 200 |
//! | POST | /admin/signups/{key}/provisioned | 200 |
//! | POST | /admin/events | 201 |
//! | GET | /admin/events/{code} | 200 |

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tollgate::TollgateConfig;
use tracing::info;

pub mod auth;
mod error;
pub mod routes;
mod state;

#[cfg(test)]
mod tests;

pub use auth::{ADMIN_ROLE, AuthError, AuthService, JwtConfig, TokenClaims};
pub use error::{ServerError, ServerResult};
pub use routes::router;
pub use state::AppState;

/// Serves the API on the configured bind address until Ctrl-C.
pub async fn run(config: TollgateConfig) -> ServerResult<()> {
    let addr: SocketAddr = config
        .server
        .bind_address
        .parse()
        .map_err(|_| ServerError::InvalidBindAddress(config.server.bind_address.clone()))?;

    let app = router(AppState::from_config(config));

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::BindFailed { addr, source })?;
    info!(%addr, "tollgate listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("tollgate stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(%err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
