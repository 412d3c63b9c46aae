//! Shared state for request handlers.

use std::sync::Arc;

use tollgate::{SignupService, TollgateConfig};

use crate::auth::{AuthService, JwtConfig};

/// Shared state for all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SignupService>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub fn new(service: Arc<SignupService>, auth: Arc<AuthService>) -> Self {
        Self { service, auth }
    }

    /// State over in-memory stores, configured from `config`.
    pub fn from_config(config: TollgateConfig) -> Self {
        let auth = AuthService::new(JwtConfig::from(&config.auth));
        Self::new(
            Arc::new(SignupService::in_memory(config)),
            Arc::new(auth),
        )
    }
}
