pub mod builder;
pub mod defaults;
pub mod merge;
pub mod types;


pub use builder::ConfigBuilder;
pub use types::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Main configuration loading function
pub fn load_config(config_file: &str) -> Result<(ConfigInput, PathBuf)> {
    let config_dir = Path::new(config_file)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let config_input = if Path::new(config_file).exists() {
        let contents = std::fs::read_to_string(config_file)
            .with_context(|| format!("Failed to read configuration file {}", config_file))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Invalid configuration file {}", config_file))?
    } else {
        ConfigInput::default()
    };

    Ok((config_input, config_dir))
}

/// Resolve a configured path against the directory holding the config file
pub fn resolve_path(root_dir: &Path, configured: &str) -> PathBuf {
    let path = Path::new(configured);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root_dir.join(path)
    }
}
