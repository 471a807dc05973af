pub mod apply;
pub mod release;
pub mod seed;
pub mod status;

pub use apply::cmd_apply;
pub use release::cmd_release;
pub use seed::cmd_seed;
pub use status::cmd_status;

use crate::config::Config;
use crate::db::DbConfigStore;
use crate::db::connection::connect_with_retry;
use anyhow::{Result, anyhow};
use sqlx::MySqlPool;

/// Database URL from the resolved configuration, or a hint on where to set it
pub(crate) fn database_url(config: &Config) -> Result<&str> {
    config.database.url.as_deref().ok_or_else(|| {
        anyhow!(
            "No database URL configured. Pass --database-url, set DATABASE_URL, or add database.url to the configuration file."
        )
    })
}

/// Connect to the panel database and open the config store on it
pub(crate) async fn open_config_store(config: &Config) -> Result<(MySqlPool, DbConfigStore)> {
    let url = database_url(config)?;
    let pool = connect_with_retry(url).await?;
    let store = DbConfigStore::new(pool.clone(), config.update.config_table.clone());
    Ok((pool, store))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_database_url_is_explained() {
        let config = Config::default();
        let err = database_url(&config).unwrap_err().to_string();
        assert!(err.contains("--database-url"));
        assert!(err.contains("DATABASE_URL"));
    }
}
