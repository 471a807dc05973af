//! Server-side named lock held on the update session.
//!
//! The server drops it when the session ends, so a crashed run never leaves
//! it behind. Names are scoped to the current schema.

use crate::db::Database;
use anyhow::{Result, anyhow};

pub const UPDATE_LOCK_NAME: &str = "panel_migrate";

const GET_LOCK_SQL: &str =
    "SELECT GET_LOCK(CONCAT(COALESCE(DATABASE(), ''), '.', ?), 0) AS acquired";
const RELEASE_LOCK_SQL: &str =
    "SELECT RELEASE_LOCK(CONCAT(COALESCE(DATABASE(), ''), '.', ?)) AS released";

/// Take the named lock without waiting
pub async fn acquire_advisory_lock(db: &mut dyn Database, name: &str) -> Result<()> {
    let rows = db.fetch_all(GET_LOCK_SQL, &[name]).await?;

    match rows.first().and_then(|row| row.get("acquired")) {
        Some("1") => Ok(()),
        Some("0") => Err(anyhow!(
            "Another database update is currently running (the '{}' database lock is held by another session).",
            name
        )),
        _ => Err(anyhow!("Failed to take the '{}' database lock", name)),
    }
}

/// Release the named lock, returning whether this session held it
pub async fn release_advisory_lock(db: &mut dyn Database, name: &str) -> Result<bool> {
    let rows = db.fetch_all(RELEASE_LOCK_SQL, &[name]).await?;
    Ok(rows.first().and_then(|row| row.get("released")) == Some("1"))
}
