use crate::commands::open_config_store;
use crate::config::{Config, resolve_path};
use crate::constants::LOCK_FILE_STALE_TIMEOUT;
use crate::db::advisory_lock::{UPDATE_LOCK_NAME, acquire_advisory_lock, release_advisory_lock};
use crate::db::connection::acquire_session;
use crate::progress::RevisionReporter;
use crate::update::{RunReport, Runner, UpdateLock, catalog};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

/// Bring the panel database up to the newest revision this release knows
pub async fn cmd_apply(config: &Config, root_dir: &Path, show_progress: bool) -> Result<RunReport> {
    let registry = catalog::registry().context("The update catalog is inconsistent")?;

    info!("Checking for concurrent update runs...");
    let lock_path = resolve_path(root_dir, &config.update.lock_file);
    let _lock = UpdateLock::acquire_with_timeout(&lock_path, LOCK_FILE_STALE_TIMEOUT)?;

    let (pool, mut store) = open_config_store(config).await?;
    let mut session = acquire_session(&pool).await?;
    if let Err(e) = acquire_advisory_lock(&mut session, UPDATE_LOCK_NAME).await {
        drop(session);
        pool.close().await;
        return Err(e);
    }

    let reporter = RevisionReporter::new(show_progress, true);
    let mut runner = Runner::new(
        &registry,
        &mut session,
        &mut store,
        &config.system,
        &config.update.watermark_key,
    )
    .with_reporter(reporter);

    let outcome = runner.run().await;
    drop(runner);
    if let Err(e) = release_advisory_lock(&mut session, UPDATE_LOCK_NAME).await {
        warn!("Failed to release the database lock: {:#}", e);
    }
    drop(session);
    pool.close().await;

    let report = outcome?;
    if report.applied.is_empty() {
        info!("Nothing to apply (revision {})", report.to);
    } else {
        info!(
            "Applied {} update(s), {} statement(s); database now at revision {}",
            report.applied.len(),
            report.statements_executed,
            report.to
        );
    }

    Ok(report)
}
