use crate::commands::open_config_store;
use crate::config::Config;
use crate::db::ConfigStore;
use crate::update::catalog::LAST_UPDATE;
use crate::update::watermark::write_watermark;
use anyhow::{Result, anyhow};
use console::style;
use tracing::{info, warn};

/// Record the newest revision on a freshly installed database, whose schema
/// already matches it
pub async fn cmd_seed(config: &Config, force: bool) -> Result<()> {
    let (pool, mut store) = open_config_store(config).await?;
    let result = seed_watermark(&mut store, &config.update.watermark_key, LAST_UPDATE, force).await;
    pool.close().await;
    result?;

    println!(
        "{} Database revision set to {}",
        style("✓").green(),
        LAST_UPDATE
    );
    Ok(())
}

async fn seed_watermark(
    store: &mut dyn ConfigStore,
    key: &str,
    revision: u32,
    force: bool,
) -> Result<()> {
    if let Some(existing) = store.get(key).await? {
        if !force {
            return Err(anyhow!(
                "The database already records revision {} under '{}'. Use --force to overwrite it.",
                existing.trim(),
                key
            ));
        }
        warn!(
            "Overwriting recorded revision {} with {}",
            existing.trim(),
            revision
        );
    }

    write_watermark(store, key, revision).await?;
    info!("Recorded revision {} under '{}'", revision, key);
    Ok(())
}
