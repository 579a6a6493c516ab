use std::path::PathBuf;

use anyhow::{Context, Result};

/// Returns the global config path: ~/.config/rtail/config.toml
pub fn global_config_path() -> Result<PathBuf> {
    let config = dirs::config_dir().context("Could not determine config directory")?;
    Ok(config.join("rtail").join("config.toml"))
}

/// Expands a leading `~` in a user-supplied path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}
