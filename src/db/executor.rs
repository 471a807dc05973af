//! Statement execution seam shared by the update runner, the schema helpers and
//! the individual update steps.

use crate::db::error_context::SqlErrorContext;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use sqlx::mysql::{MySql, MySqlRow};
use sqlx::pool::PoolConnection;
use sqlx::{Column, Row as _};
use std::collections::BTreeMap;
use tracing::debug;

/// A fetched row with every value rendered as text (`None` for SQL NULL)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    values: BTreeMap<String, Option<String>>,
}

impl Row {
    pub fn new<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.map(Into::into)))
                .collect(),
        }
    }

    /// Value of a column, `None` when the column is NULL or absent
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).and_then(|v| v.as_deref())
    }

    /// Value of a column that must be present and non-NULL
    pub fn require(&self, column: &str) -> Result<&str> {
        self.get(column)
            .ok_or_else(|| anyhow!("Column '{}' is NULL or missing from the result set", column))
    }

    pub fn is_null(&self, column: &str) -> bool {
        matches!(self.values.get(column), Some(None))
    }
}

/// SQL execution interface. Implementations keep one session for their whole
/// lifetime so multi-statement repairs see their own intermediate state.
#[async_trait(?Send)]
pub trait Database {
    /// Execute a statement without parameters, returning the affected row count
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Execute a parameterized statement (`?` placeholders)
    async fn execute_with(&mut self, sql: &str, params: &[&str]) -> Result<u64>;

    /// Run a parameterized query and collect every row
    async fn fetch_all(&mut self, sql: &str, params: &[&str]) -> Result<Vec<Row>>;
}

/// MySQL/MariaDB session backed by a single pooled connection
pub struct MySqlDatabase {
    conn: PoolConnection<MySql>,
}

impl MySqlDatabase {
    pub fn new(conn: PoolConnection<MySql>) -> Self {
        Self { conn }
    }
}

#[async_trait(?Send)]
impl Database for MySqlDatabase {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        debug!("Executing: {}", sql.trim());
        // Text protocol: some DDL and administrative statements cannot be prepared
        let result = sqlx::raw_sql(sql)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| anyhow!(SqlErrorContext::from_sqlx_error(&e).format(sql)))?;

        Ok(result.rows_affected())
    }

    async fn execute_with(&mut self, sql: &str, params: &[&str]) -> Result<u64> {
        debug!("Executing: {} {:?}", sql.trim(), params);
        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(*param);
        }

        let result = query
            .execute(&mut *self.conn)
            .await
            .map_err(|e| anyhow!(SqlErrorContext::from_sqlx_error(&e).format(sql)))?;

        Ok(result.rows_affected())
    }

    async fn fetch_all(&mut self, sql: &str, params: &[&str]) -> Result<Vec<Row>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(*param);
        }

        let rows = query
            .fetch_all(&mut *self.conn)
            .await
            .map_err(|e| anyhow!(SqlErrorContext::from_sqlx_error(&e).format(sql)))?;

        rows.iter().map(row_to_text).collect()
    }
}

/// Render every column of a MySQL row as text, trying the decodings the panel
/// schema actually uses (strings, signed and unsigned integers, floats, blobs)
fn row_to_text(row: &MySqlRow) -> Result<Row> {
    let mut values = BTreeMap::new();

    for (idx, column) in row.columns().iter().enumerate() {
        let value = if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            v
        } else if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            v.map(|n| n.to_string())
        } else if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
            v.map(|n| n.to_string())
        } else if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            v.map(|n| n.to_string())
        } else if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            v.map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        } else {
            return Err(anyhow!(
                "Unsupported value type for column '{}'",
                column.name()
            ));
        };

        values.insert(column.name().to_string(), value);
    }

    Ok(Row { values })
}
