use crate::commands::open_config_store;
use crate::config::{Config, resolve_path};
use crate::constants::VERSION_KEY;
use crate::db::ConfigStore;
use crate::update::ReleaseChecker;
use anyhow::Result;
use console::style;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

pub struct ReleaseArgs {
    pub refresh: bool,
    pub current_version: Option<String>,
}

/// Compare the running panel version against the latest published release
pub async fn cmd_release(config: &Config, root_dir: &Path, args: ReleaseArgs) -> Result<()> {
    let current = match args.current_version {
        Some(version) => Some(version),
        None => installed_version(config).await,
    };

    let cache_file = resolve_path(root_dir, &config.release.cache_file);
    let mut checker = ReleaseChecker::new(
        config.release.api_url.clone(),
        cache_file,
        Duration::from_secs(config.release.freshness_hours * 3600),
        current.as_deref(),
    )?;

    if args.refresh {
        checker.release_info(true).await?;
    }
    let latest = checker.latest_known_version().await?;
    let update_available = checker.is_update_available().await?;

    println!("Current version: {}", style(checker.current_version()).cyan());
    println!("Latest version:  {}", style(&latest).cyan());

    if update_available {
        println!("{} A new release is available", style("!").yellow());
        if let Ok(info) = checker.release_info(false).await
            && let Some(html_url) = &info.html_url
        {
            println!("  {}", html_url);
        }
    } else {
        println!("{} No update available", style("✓").green());
    }

    Ok(())
}

/// Installed version from the `system` settings, else from the config table
async fn installed_version(config: &Config) -> Option<String> {
    if let Some(version) = config.system.get(VERSION_KEY) {
        return Some(version.to_string());
    }
    config.database.url.as_ref()?;

    match open_config_store(config).await {
        Ok((pool, mut store)) => {
            let version = store.get(VERSION_KEY).await;
            pool.close().await;
            match version {
                Ok(version) => version,
                Err(e) => {
                    warn!("Could not read the installed version: {:#}", e);
                    None
                }
            }
        }
        Err(e) => {
            debug!("Skipping config table lookup: {:#}", e);
            None
        }
    }
}
