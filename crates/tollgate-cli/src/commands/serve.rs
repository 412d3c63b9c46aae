//! Serve command - runs the HTTP API.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

pub fn run(dir: Option<&Path>, address: Option<String>, dev: bool) -> Result<()> {
    let mut config = super::load_config(dir)?;

    if dev {
        config.verification.enabled = false;
        config.approval.automatic = true;
        warn!("development mode: verification disabled, approval automatic");
    }
    if let Some(address) = address {
        config.server.bind_address = address;
    }
    config.validate()?;

    info!(
        bind = %config.server.bind_address,
        clusters = config.clusters.len(),
        verification = config.verification.enabled,
        automatic_approval = config.approval.automatic,
        "starting tollgate"
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime
        .block_on(tollgate_server::run(config))
        .context("Server failed")
}
