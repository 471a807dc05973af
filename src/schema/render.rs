//! MySQL DDL rendering for the statements update steps emit.
//!
//! Every function here is pure: the guarded variants in `builder` decide
//! whether a statement is needed, these only decide what it looks like.

use std::fmt;

/// Kind of index to create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Index,
    Unique,
    Key,
    Primary,
}

impl IndexKind {
    pub fn is_unique(self) -> bool {
        matches!(self, IndexKind::Unique | IndexKind::Primary)
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::Index => write!(f, "INDEX"),
            IndexKind::Unique => write!(f, "UNIQUE"),
            IndexKind::Key => write!(f, "KEY"),
            IndexKind::Primary => write!(f, "PRIMARY KEY"),
        }
    }
}

/// Name MySQL gives the primary key
pub const PRIMARY: &str = "PRIMARY";

pub fn quote_ident(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

pub fn escape_string(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
}

/// Quote an index column spec, keeping a prefix length such as `name(255)` outside the quotes
pub fn quote_index_column(spec: &str) -> String {
    let spec = spec.trim();
    match spec.split_once('(') {
        Some((name, length)) if length.ends_with(')') => {
            format!("{}({}", quote_ident(name.trim()), length)
        }
        _ => quote_ident(spec),
    }
}

/// Column name of an index column spec, without any prefix length
pub fn index_column_name(spec: &str) -> &str {
    spec.split_once('(')
        .map_or(spec, |(name, _)| name)
        .trim()
}

pub fn render_add_column(table: &str, column: &str, definition: &str) -> String {
    format!(
        "ALTER TABLE {} ADD {} {}",
        quote_ident(table),
        quote_ident(column),
        definition.trim()
    )
}

/// `definition` starts with the (possibly new) column name
pub fn render_change_column(table: &str, column: &str, definition: &str) -> String {
    format!(
        "ALTER TABLE {} CHANGE {} {}",
        quote_ident(table),
        quote_ident(column),
        definition.trim()
    )
}

pub fn render_drop_column(table: &str, column: &str) -> String {
    format!(
        "ALTER TABLE {} DROP {}",
        quote_ident(table),
        quote_ident(column)
    )
}

pub fn render_add_index(table: &str, kind: IndexKind, name: &str, columns: &[&str]) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_index_column(c))
        .collect::<Vec<_>>()
        .join(", ");

    match kind {
        IndexKind::Primary => format!(
            "ALTER TABLE {} ADD PRIMARY KEY ({})",
            quote_ident(table),
            column_list
        ),
        _ => format!(
            "ALTER TABLE {} ADD {} {} ({})",
            quote_ident(table),
            kind,
            quote_ident(name),
            column_list
        ),
    }
}

pub fn render_drop_index(table: &str, name: &str) -> String {
    if name == PRIMARY {
        format!("ALTER TABLE {} DROP PRIMARY KEY", quote_ident(table))
    } else {
        format!(
            "ALTER TABLE {} DROP INDEX {}",
            quote_ident(table),
            quote_ident(name)
        )
    }
}

pub fn render_rename_table(table: &str, new_name: &str) -> String {
    format!(
        "ALTER TABLE {} RENAME TO {}",
        quote_ident(table),
        quote_ident(new_name)
    )
}

pub fn render_drop_table(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(table))
}
