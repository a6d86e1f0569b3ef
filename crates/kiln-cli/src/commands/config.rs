//! Print the effective configuration

use anyhow::{Context, Result};

pub fn run(path: Option<&str>) -> Result<()> {
    let config = super::load_config(path)?;
    let text = config
        .to_toml_string()
        .context("Failed to serialize configuration")?;
    print!("{}", text);
    Ok(())
}
