//! Read-only questions about the live schema, answered from information_schema
//! for the current database.

use crate::db::Database;
use crate::schema::render::index_column_name;
use itertools::Itertools;
use thiserror::Error;

pub(crate) const TABLE_EXISTS_SQL: &str =
    "SELECT COUNT(*) AS total FROM information_schema.TABLES WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?";

pub(crate) const COLUMN_EXISTS_SQL: &str =
    "SELECT COUNT(*) AS total FROM information_schema.COLUMNS WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND COLUMN_NAME = ?";

pub(crate) const INDEX_COLUMNS_SQL: &str =
    "SELECT INDEX_NAME AS index_name, COLUMN_NAME AS column_name, NON_UNIQUE AS non_unique FROM information_schema.STATISTICS WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? ORDER BY INDEX_NAME, SEQ_IN_INDEX";

/// An introspection query failed; the step that asked cannot decide what to do
#[derive(Debug, Error)]
#[error("Schema introspection failed while {action}")]
pub struct IntrospectionError {
    action: String,
    #[source]
    source: anyhow::Error,
}

impl IntrospectionError {
    fn new(action: String, source: anyhow::Error) -> Self {
        Self { action, source }
    }
}

/// An index and its columns in key order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// How to look up an index: by its name, or by the exact list of columns it covers
#[derive(Debug, Clone, Copy)]
pub enum IndexLookup<'q> {
    Name(&'q str),
    Columns(&'q [&'q str]),
}

pub struct SchemaIntrospector<'a> {
    db: &'a mut dyn Database,
}

impl<'a> SchemaIntrospector<'a> {
    pub fn new(db: &'a mut dyn Database) -> Self {
        Self { db }
    }

    pub async fn table_exists(&mut self, table: &str) -> Result<bool, IntrospectionError> {
        let rows = self
            .db
            .fetch_all(TABLE_EXISTS_SQL, &[table])
            .await
            .map_err(|e| IntrospectionError::new(format!("checking table `{}`", table), e))?;

        Ok(count_is_positive(&rows))
    }

    pub async fn column_exists(
        &mut self,
        table: &str,
        column: &str,
    ) -> Result<bool, IntrospectionError> {
        let rows = self
            .db
            .fetch_all(COLUMN_EXISTS_SQL, &[table, column])
            .await
            .map_err(|e| {
                IntrospectionError::new(format!("checking column `{}`.`{}`", table, column), e)
            })?;

        Ok(count_is_positive(&rows))
    }

    /// Every index of `table`, sorted by name
    pub async fn indexes(&mut self, table: &str) -> Result<Vec<IndexInfo>, IntrospectionError> {
        let rows = self
            .db
            .fetch_all(INDEX_COLUMNS_SQL, &[table])
            .await
            .map_err(|e| {
                IntrospectionError::new(format!("listing indexes of `{}`", table), e)
            })?;

        let mut indexes = Vec::new();
        for (name, group) in &rows
            .iter()
            .chunk_by(|r| r.get("index_name").unwrap_or_default().to_string())
        {
            let group: Vec<_> = group.collect();
            let unique = group.first().and_then(|r| r.get("non_unique")) == Some("0");
            indexes.push(IndexInfo {
                name,
                columns: group
                    .iter()
                    .filter_map(|r| r.get("column_name"))
                    .map(str::to_string)
                    .collect(),
                unique,
            });
        }

        Ok(indexes)
    }

    pub async fn index_exists(
        &mut self,
        table: &str,
        lookup: IndexLookup<'_>,
    ) -> Result<bool, IntrospectionError> {
        let indexes = self.indexes(table).await?;

        Ok(match lookup {
            IndexLookup::Name(name) => indexes.iter().any(|i| i.name == name),
            IndexLookup::Columns(columns) => indexes.iter().any(|i| covers_exactly(i, columns)),
        })
    }

    /// Names of the indexes that include `column`, sorted by name
    pub async fn indexes_covering(
        &mut self,
        table: &str,
        column: &str,
    ) -> Result<Vec<String>, IntrospectionError> {
        let indexes = self.indexes(table).await?;

        Ok(indexes
            .into_iter()
            .filter(|i| i.columns.iter().any(|c| c == column))
            .map(|i| i.name)
            .collect())
    }
}

/// Whether an index covers exactly `columns`, in order (prefix lengths ignored)
pub fn covers_exactly(index: &IndexInfo, columns: &[&str]) -> bool {
    index.columns.len() == columns.len()
        && index
            .columns
            .iter()
            .zip(columns)
            .all(|(have, want)| have == index_column_name(want))
}

fn count_is_positive(rows: &[crate::db::Row]) -> bool {
    rows.first()
        .and_then(|r| r.get("total"))
        .and_then(|v| v.parse::<u64>().ok())
        .is_some_and(|n| n > 0)
}
