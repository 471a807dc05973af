//! Guarded DDL builders.
//!
//! Each builder consults the live schema and returns `None` when the change is
//! already in place, so a step can be re-run after a partial failure without
//! tripping over its own earlier statements.

use crate::db::Database;
use crate::schema::introspect::{IndexLookup, IntrospectionError, SchemaIntrospector};
use crate::schema::render::{
    self, IndexKind, PRIMARY, index_column_name, render_add_column, render_add_index,
    render_change_column, render_drop_column, render_drop_index, render_drop_table,
    render_rename_table,
};
use tracing::debug;

pub struct StatementBuilder<'a> {
    schema: SchemaIntrospector<'a>,
}

impl<'a> StatementBuilder<'a> {
    pub fn new(db: &'a mut dyn Database) -> Self {
        Self {
            schema: SchemaIntrospector::new(db),
        }
    }

    /// Direct access to the introspection queries
    pub fn introspector(&mut self) -> &mut SchemaIntrospector<'a> {
        &mut self.schema
    }

    pub async fn is_table(&mut self, table: &str) -> Result<bool, IntrospectionError> {
        self.schema.table_exists(table).await
    }

    /// `ADD` a column unless it already exists
    pub async fn add_column(
        &mut self,
        table: &str,
        column: &str,
        definition: &str,
    ) -> Result<Option<String>, IntrospectionError> {
        if self.schema.column_exists(table, column).await? {
            debug!("Column `{}`.`{}` already present", table, column);
            return Ok(None);
        }

        Ok(Some(render_add_column(table, column, definition)))
    }

    /// `CHANGE` a column. Always rendered: callers only reach it on a revision
    /// that has not run yet, and the definition may rename the column.
    pub fn change_column(&self, table: &str, column: &str, definition: &str) -> String {
        render_change_column(table, column, definition)
    }

    pub async fn drop_column(
        &mut self,
        table: &str,
        column: &str,
    ) -> Result<Option<String>, IntrospectionError> {
        if !self.schema.column_exists(table, column).await? {
            debug!("Column `{}`.`{}` already gone", table, column);
            return Ok(None);
        }

        Ok(Some(render_drop_column(table, column)))
    }

    /// Add an index unless an equivalent one exists: same name, or (for
    /// non-primary keys) the same columns with the same uniqueness.
    ///
    /// The name defaults to the first column (without prefix length), or
    /// `PRIMARY` for a primary key.
    pub async fn add_index(
        &mut self,
        table: &str,
        columns: &[&str],
        kind: IndexKind,
        name: Option<&str>,
    ) -> Result<Option<String>, IntrospectionError> {
        let Some(first) = columns.first() else {
            return Ok(None);
        };
        let name = match kind {
            IndexKind::Primary => PRIMARY,
            _ => name.unwrap_or_else(|| index_column_name(first)),
        };

        let existing = self.schema.indexes(table).await?;
        let equivalent = existing.iter().any(|index| {
            index.name == name
                || (kind != IndexKind::Primary
                    && index.unique == kind.is_unique()
                    && crate::schema::introspect::covers_exactly(index, columns))
        });

        if equivalent {
            debug!("Index `{}` on `{}` already present", name, table);
            return Ok(None);
        }

        Ok(Some(render_add_index(table, kind, name, columns)))
    }

    pub async fn drop_index_by_name(
        &mut self,
        table: &str,
        name: &str,
    ) -> Result<Option<String>, IntrospectionError> {
        if !self
            .schema
            .index_exists(table, IndexLookup::Name(name))
            .await?
        {
            return Ok(None);
        }

        Ok(Some(render_drop_index(table, name)))
    }

    /// Drop every index that includes `column`
    pub async fn drop_index_by_column(
        &mut self,
        table: &str,
        column: &str,
    ) -> Result<Option<Vec<String>>, IntrospectionError> {
        let names = self.schema.indexes_covering(table, column).await?;
        if names.is_empty() {
            return Ok(None);
        }

        Ok(Some(
            names
                .iter()
                .map(|name| render_drop_index(table, name))
                .collect(),
        ))
    }

    /// Rename unless the source is gone or the target already exists
    pub async fn rename_table(
        &mut self,
        table: &str,
        new_name: &str,
    ) -> Result<Option<String>, IntrospectionError> {
        if !self.schema.table_exists(table).await? || self.schema.table_exists(new_name).await? {
            return Ok(None);
        }

        Ok(Some(render_rename_table(table, new_name)))
    }

    pub fn drop_table(&self, table: &str) -> String {
        render_drop_table(table)
    }

    pub fn quote(&self, ident: &str) -> String {
        render::quote_ident(ident)
    }
}
