use crate::commands::open_config_store;
use crate::config::Config;
use crate::update::watermark::read_watermark;
use crate::update::{Registry, UpdateError, VersionGate, catalog};
use anyhow::{Context, Result};
use console::style;

pub async fn cmd_status(config: &Config) -> Result<()> {
    let registry = catalog::registry().context("The update catalog is inconsistent")?;

    let (pool, mut store) = open_config_store(config).await?;
    let watermark = read_watermark(&mut store, &config.update.watermark_key).await;
    pool.close().await;
    let watermark = watermark?;

    println!("Database revision: {}", style(watermark).cyan());
    println!("Latest revision:   {}", style(registry.target()).cyan());

    let pending = pending_updates(&registry, watermark)?;
    if pending.is_empty() {
        println!("{} Database is up to date", style("✓").green());
    } else {
        println!("Pending updates ({}):", pending.len());
        for line in pending {
            println!("  {}", line);
        }
    }

    Ok(())
}

/// One line per revision still to apply, in run order. A database ahead of
/// this release is reported as a downgrade.
fn pending_updates(registry: &Registry, watermark: u32) -> Result<Vec<String>, UpdateError> {
    VersionGate::new(watermark, registry.target()).check()?;

    Ok(registry
        .pending(watermark)
        .map(|step| format!("r{}: {}", step.revision, step.description))
        .collect())
}
