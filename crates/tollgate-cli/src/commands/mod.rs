//! Subcommand implementations.

pub mod config;
pub mod serve;
pub mod token;

use std::path::Path;

use anyhow::{Context, Result};
use tollgate_config::{ConfigLoader, TollgateConfig};

/// Loads the layered configuration, rooted at `dir` when given.
pub(crate) fn load_config(dir: Option<&Path>) -> Result<TollgateConfig> {
    let loader = match dir {
        Some(dir) => ConfigLoader::new().with_project_dir(dir),
        None => ConfigLoader::new(),
    };
    loader.load().context("Failed to load configuration")
}
