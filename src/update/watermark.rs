//! The revision watermark: number of the last update applied to this database.

use crate::db::ConfigStore;
use anyhow::{Result, anyhow};
use tracing::warn;

/// Read the watermark. A database that never recorded one is treated as revision 0.
pub async fn read_watermark(store: &mut dyn ConfigStore, key: &str) -> Result<u32> {
    let Some(value) = store.get(key).await? else {
        warn!(
            "No '{}' entry found in the config table; assuming no update was ever applied",
            key
        );
        return Ok(0);
    };

    value
        .trim()
        .parse::<u32>()
        .map_err(|_| {
            anyhow!(
                "Invalid value '{}' stored for '{}': expected a revision number",
                value,
                key
            )
        })
}

pub async fn write_watermark(store: &mut dyn ConfigStore, key: &str, revision: u32) -> Result<()> {
    store.set(key, &revision.to_string()).await
}
