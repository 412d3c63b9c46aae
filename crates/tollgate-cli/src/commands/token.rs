//! Token command - mints a development bearer token.

use std::path::Path;

use anyhow::{Context, Result};
use tollgate::IdentityClaims;
use tollgate_server::{AuthService, JwtConfig};

pub fn run(
    dir: Option<&Path>,
    subject: &str,
    email: &str,
    username: Option<String>,
    roles: Vec<String>,
) -> Result<()> {
    let config = super::load_config(dir)?;
    let auth = AuthService::new(JwtConfig::from(&config.auth));

    let identity = IdentityClaims {
        sub: subject.to_string(),
        email: email.to_string(),
        preferred_username: username,
        ..Default::default()
    };
    let token = auth
        .issue(&identity, roles)
        .context("Failed to sign token")?;
    println!("{token}");
    Ok(())
}
