//! Key/value access to the panel's persistent `config` table.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::MySqlPool;

/// Persistent key/value store holding panel settings, including the revision watermark
#[async_trait(?Send)]
pub trait ConfigStore {
    async fn get(&mut self, key: &str) -> Result<Option<String>>;

    /// Insert or overwrite a key
    async fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Remove a key, returning whether it existed
    async fn unset(&mut self, key: &str) -> Result<bool>;

    /// Remove every key starting with `prefix`, returning how many were removed
    async fn unset_matching(&mut self, prefix: &str) -> Result<u64>;
}

/// Config store backed by the `config` table (`name` / `value` columns).
///
/// Runs on the pool rather than the step session so every write autocommits
/// independently of the statements an update step issues.
pub struct DbConfigStore {
    pool: MySqlPool,
    table: String,
}

impl DbConfigStore {
    /// `table` must already be validated as a plain identifier
    pub fn new(pool: MySqlPool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }
}

#[async_trait(?Send)]
impl ConfigStore for DbConfigStore {
    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        let sql = format!("SELECT `value` FROM `{}` WHERE `name` = ?", self.table);
        let value: Option<(Option<String>,)> = sqlx::query_as(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to read '{}' from the {} table", key, self.table))?;

        Ok(value.and_then(|(v,)| v))
    }

    async fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let sql = format!(
            "INSERT INTO `{}` (`name`, `value`) VALUES (?, ?) ON DUPLICATE KEY UPDATE `value` = VALUES(`value`)",
            self.table
        );
        sqlx::query(&sql)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to write '{}' to the {} table", key, self.table))?;

        Ok(())
    }

    async fn unset(&mut self, key: &str) -> Result<bool> {
        let sql = format!("DELETE FROM `{}` WHERE `name` = ?", self.table);
        let result = sqlx::query(&sql)
            .bind(key)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete '{}' from the {} table", key, self.table))?;

        Ok(result.rows_affected() > 0)
    }

    async fn unset_matching(&mut self, prefix: &str) -> Result<u64> {
        let sql = unset_matching_sql(&self.table);
        let result = sqlx::query(&sql)
            .bind(like_prefix(prefix))
            .execute(&self.pool)
            .await
            .with_context(|| {
                format!("Failed to delete '{}*' from the {} table", prefix, self.table)
            })?;

        Ok(result.rows_affected())
    }
}

fn unset_matching_sql(table: &str) -> String {
    format!("DELETE FROM `{}` WHERE `name` LIKE ?", table)
}

/// LIKE pattern matching names that start with `prefix` literally
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
