//! Config command - prints the effective configuration.

use std::path::Path;

use anyhow::Result;

pub fn run(dir: Option<&Path>) -> Result<()> {
    let config = super::load_config(dir)?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}
