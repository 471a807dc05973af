//! In-memory stand-ins for the database seams, used by unit tests.
//!
//! `FakeDatabase` keeps a small schema model (tables, columns, indexes), answers
//! the introspection queries and applies the DDL shapes the statement renderers
//! emit, failing the way MySQL would on duplicate or missing objects.

use crate::db::{ConfigStore, Database, Row};
use crate::schema::introspect::{COLUMN_EXISTS_SQL, INDEX_COLUMNS_SQL, TABLE_EXISTS_SQL};
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeTable {
    pub columns: Vec<String>,
    pub indexes: Vec<FakeIndex>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeIndex {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

#[derive(Debug, Default)]
pub struct FakeDatabase {
    tables: BTreeMap<String, FakeTable>,
    executed: Vec<String>,
    canned: HashMap<String, Vec<Row>>,
    failures: Vec<String>,
    fail_queries: bool,
}

impl FakeDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, columns: &[&str]) -> Self {
        self.tables.insert(
            name.to_string(),
            FakeTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                indexes: Vec::new(),
            },
        );
        self
    }

    pub fn with_index(mut self, table: &str, name: &str, columns: &[&str], unique: bool) -> Self {
        self.tables
            .entry(table.to_string())
            .or_default()
            .indexes
            .push(FakeIndex {
                name: name.to_string(),
                columns: columns.iter().map(|c| c.to_string()).collect(),
                unique,
            });
        self
    }

    /// Rows returned for a query whose SQL matches `sql` exactly (after trimming)
    pub fn with_rows(mut self, sql: &str, rows: Vec<Row>) -> Self {
        self.canned.insert(sql.trim().to_string(), rows);
        self
    }

    /// Make any executed statement containing `fragment` fail
    pub fn fail_on(mut self, fragment: &str) -> Self {
        self.failures.push(fragment.to_string());
        self
    }

    /// Make every read query fail, as a lost connection would
    pub fn fail_queries(mut self) -> Self {
        self.fail_queries = true;
        self
    }

    /// Statements that executed successfully, in order
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    pub fn table(&self, name: &str) -> Option<&FakeTable> {
        self.tables.get(name)
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.tables
            .get(table)
            .is_some_and(|t| t.columns.iter().any(|c| c == column))
    }

    pub fn index(&self, table: &str, name: &str) -> Option<&FakeIndex> {
        self.tables
            .get(table)
            .and_then(|t| t.indexes.iter().find(|i| i.name == name))
    }

    fn run(&mut self, sql: &str) -> Result<u64> {
        if let Some(fragment) = self.failures.iter().find(|f| sql.contains(f.as_str())) {
            bail!("Simulated failure on statement matching '{}'", fragment);
        }

        self.apply_ddl(sql.trim())?;
        self.executed.push(sql.trim().to_string());
        Ok(1)
    }

    fn apply_ddl(&mut self, sql: &str) -> Result<()> {
        if let Some(rest) = sql.strip_prefix("ALTER TABLE ") {
            let (table, action) = take_ident(rest)?;
            return self.alter_table(&table, action.trim_start());
        }

        if let Some(rest) = sql.strip_prefix("CREATE TABLE ") {
            let if_not_exists = rest.starts_with("IF NOT EXISTS ");
            let rest = rest.trim_start_matches("IF NOT EXISTS ");
            let (name, body) = take_ident(rest)?;

            if self.tables.contains_key(&name) {
                if if_not_exists {
                    return Ok(());
                }
                bail!("Table '{}' already exists", name);
            }

            let body = body.trim_start();
            let table = if let Some(source) = body.strip_prefix("LIKE ") {
                let (source, _) = take_ident(source)?;
                self.tables
                    .get(&source)
                    .cloned()
                    .ok_or_else(|| anyhow!("Table '{}' doesn't exist", source))?
            } else {
                parse_create_body(body)
            };

            self.tables.insert(name, table);
            return Ok(());
        }

        if let Some(rest) = sql.strip_prefix("DROP TABLE IF EXISTS ") {
            let (name, _) = take_ident(rest)?;
            self.tables.remove(&name);
        }

        Ok(())
    }

    fn alter_table(&mut self, name: &str, action: &str) -> Result<()> {
        if let Some(rest) = action.strip_prefix("RENAME TO ") {
            let (new_name, _) = take_ident(rest)?;
            if self.tables.contains_key(&new_name) {
                bail!("Table '{}' already exists", new_name);
            }
            let table = self
                .tables
                .remove(name)
                .ok_or_else(|| anyhow!("Table '{}' doesn't exist", name))?;
            self.tables.insert(new_name, table);
            return Ok(());
        }

        let table = self
            .tables
            .get_mut(name)
            .ok_or_else(|| anyhow!("Table '{}' doesn't exist", name))?;

        if let Some(rest) = action.strip_prefix("ADD PRIMARY KEY") {
            if table.indexes.iter().any(|i| i.name == "PRIMARY") {
                bail!("Multiple primary key defined");
            }
            table.indexes.push(FakeIndex {
                name: "PRIMARY".to_string(),
                columns: idents(rest),
                unique: true,
            });
        } else if let Some((unique, rest)) = action
            .strip_prefix("ADD UNIQUE ")
            .map(|r| (true, r))
            .or_else(|| action.strip_prefix("ADD INDEX ").map(|r| (false, r)))
            .or_else(|| action.strip_prefix("ADD KEY ").map(|r| (false, r)))
        {
            let (index, cols) = take_ident(rest)?;
            if table.indexes.iter().any(|i| i.name == index) {
                bail!("Duplicate key name '{}'", index);
            }
            table.indexes.push(FakeIndex {
                name: index,
                columns: idents(cols),
                unique,
            });
        } else if let Some(rest) = action.strip_prefix("ADD ") {
            let (column, _) = take_ident(rest)?;
            if table.columns.contains(&column) {
                bail!("Duplicate column name '{}'", column);
            }
            table.columns.push(column);
        } else if action.starts_with("DROP PRIMARY KEY") {
            drop_index(table, "PRIMARY")?;
        } else if let Some(rest) = action.strip_prefix("DROP INDEX ") {
            let (index, _) = take_ident(rest)?;
            drop_index(table, &index)?;
        } else if let Some(rest) = action.strip_prefix("DROP ") {
            let (column, _) = take_ident(rest)?;
            let before = table.columns.len();
            table.columns.retain(|c| *c != column);
            if table.columns.len() == before {
                bail!("Can't DROP '{}'; check that column/key exists", column);
            }
            for index in &mut table.indexes {
                index.columns.retain(|c| *c != column);
            }
            table.indexes.retain(|i| !i.columns.is_empty());
        } else if let Some(rest) = action.strip_prefix("CHANGE ") {
            let (old, definition) = take_ident(rest)?;
            let definition = definition.trim_start();
            let new = if definition.starts_with('`') {
                take_ident(definition)?.0
            } else {
                definition
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_string()
            };
            let column = table
                .columns
                .iter_mut()
                .find(|c| **c == old)
                .ok_or_else(|| anyhow!("Unknown column '{}' in '{}'", old, name))?;
            *column = new.clone();
            for index in &mut table.indexes {
                for c in index.columns.iter_mut().filter(|c| **c == old) {
                    *c = new.clone();
                }
            }
        }

        Ok(())
    }
}

#[async_trait(?Send)]
impl Database for FakeDatabase {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        self.run(sql)
    }

    async fn execute_with(&mut self, sql: &str, _params: &[&str]) -> Result<u64> {
        self.run(sql)
    }

    async fn fetch_all(&mut self, sql: &str, params: &[&str]) -> Result<Vec<Row>> {
        if self.fail_queries {
            bail!("Lost connection to MySQL server during query");
        }

        if sql == TABLE_EXISTS_SQL {
            let total = usize::from(self.tables.contains_key(params[0]));
            return Ok(vec![Row::new([("total", Some(total.to_string()))])]);
        }

        if sql == COLUMN_EXISTS_SQL {
            let total = usize::from(self.has_column(params[0], params[1]));
            return Ok(vec![Row::new([("total", Some(total.to_string()))])]);
        }

        if sql == INDEX_COLUMNS_SQL {
            let mut indexes = self
                .tables
                .get(params[0])
                .map(|t| t.indexes.clone())
                .unwrap_or_default();
            indexes.sort_by(|a, b| a.name.cmp(&b.name));

            return Ok(indexes
                .iter()
                .flat_map(|index| {
                    index.columns.iter().map(move |column| {
                        Row::new([
                            ("index_name", Some(index.name.clone())),
                            ("column_name", Some(column.clone())),
                            (
                                "non_unique",
                                Some(if index.unique { "0" } else { "1" }.to_string()),
                            ),
                        ])
                    })
                })
                .collect());
        }

        Ok(self.canned.get(sql.trim()).cloned().unwrap_or_default())
    }
}

fn drop_index(table: &mut FakeTable, name: &str) -> Result<()> {
    let before = table.indexes.len();
    table.indexes.retain(|i| i.name != name);
    if table.indexes.len() == before {
        bail!("Can't DROP '{}'; check that column/key exists", name);
    }
    Ok(())
}

/// Split a leading backtick-quoted identifier off `s`
fn take_ident(s: &str) -> Result<(String, &str)> {
    let s = s.trim_start();
    let body = s
        .strip_prefix('`')
        .ok_or_else(|| anyhow!("Expected a quoted identifier in '{}'", s))?;

    let mut name = String::new();
    let mut chars = body.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if c == '`' {
            if let Some((_, '`')) = chars.peek() {
                name.push('`');
                chars.next();
                continue;
            }
            return Ok((name, &body[idx + 1..]));
        }
        name.push(c);
    }

    bail!("Unterminated identifier in '{}'", s)
}

/// Every backtick-quoted identifier in `s`, in order
fn idents(s: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = s;
    while let Some(pos) = rest.find('`') {
        match take_ident(&rest[pos..]) {
            Ok((name, tail)) => {
                found.push(name);
                rest = tail;
            }
            Err(_) => break,
        }
    }
    found
}

/// Columns and keys of a `CREATE TABLE ... ( ... )` body
fn parse_create_body(body: &str) -> FakeTable {
    let mut table = FakeTable::default();
    let (Some(open), Some(close)) = (body.find('('), body.rfind(')')) else {
        return table;
    };

    let mut depth = 0;
    let mut start = open + 1;
    let mut items = Vec::new();
    for (idx, c) in body[open + 1..close].char_indices() {
        let idx = idx + open + 1;
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                items.push(&body[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    items.push(&body[start..close]);

    for item in items.iter().map(|i| i.trim()) {
        if item.starts_with('`') {
            if let Ok((column, _)) = take_ident(item) {
                table.columns.push(column);
            }
        } else if let Some(rest) = item.strip_prefix("PRIMARY KEY") {
            table.indexes.push(FakeIndex {
                name: "PRIMARY".to_string(),
                columns: idents(rest),
                unique: true,
            });
        } else {
            let unique = item.starts_with("UNIQUE");
            let names = idents(item);
            if let Some((name, columns)) = names.split_first() {
                table.indexes.push(FakeIndex {
                    name: name.clone(),
                    columns: columns.to_vec(),
                    unique,
                });
            }
        }
    }

    table
}

/// Config store kept in memory, with optional write failure injection
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    values: BTreeMap<String, String>,
    fail_writes_after: Option<usize>,
    writes: usize,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }

    /// Let `count` writes succeed, then fail every following one
    pub fn fail_writes_after(mut self, count: usize) -> Self {
        self.fail_writes_after = Some(count);
        self
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

#[async_trait(?Send)]
impl ConfigStore for MemoryConfigStore {
    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    async fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes_after.is_some_and(|limit| self.writes >= limit) {
            bail!("Simulated write failure for '{}'", key);
        }
        self.writes += 1;
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn unset(&mut self, key: &str) -> Result<bool> {
        Ok(self.values.remove(key).is_some())
    }

    async fn unset_matching(&mut self, prefix: &str) -> Result<u64> {
        let before = self.values.len();
        self.values.retain(|key, _| !key.starts_with(prefix));
        Ok((before - self.values.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_applies_rendered_ddl() {
        let mut db = FakeDatabase::new().with_table("domain", &["domain_id", "domain_name"]);

        db.execute("ALTER TABLE `domain` ADD `domain_php` VARCHAR(15) NOT NULL DEFAULT 'no'")
            .await
            .unwrap();
        db.execute("ALTER TABLE `domain` ADD UNIQUE `domain_name` (`domain_name`)")
            .await
            .unwrap();
        db.execute("ALTER TABLE `domain` CHANGE `domain_php` `php` VARCHAR(15)")
            .await
            .unwrap();

        assert!(db.has_column("domain", "php"));
        assert!(!db.has_column("domain", "domain_php"));
        assert!(db.index("domain", "domain_name").unwrap().unique);

        let err = db
            .execute("ALTER TABLE `domain` DROP `domain_php`")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("check that column/key exists"));
    }

    #[tokio::test]
    async fn test_fake_create_table_like_and_rename() {
        let mut db = FakeDatabase::new()
            .with_table("php_ini", &["id", "domain_id", "domain_type"])
            .with_index("php_ini", "PRIMARY", &["id"], true);

        db.execute("ALTER TABLE `php_ini` RENAME TO `old_php_ini`")
            .await
            .unwrap();
        db.execute("CREATE TABLE `php_ini` LIKE `old_php_ini`")
            .await
            .unwrap();
        db.execute("DROP TABLE IF EXISTS `old_php_ini`").await.unwrap();

        assert!(db.table("old_php_ini").is_none());
        assert_eq!(db.index("php_ini", "PRIMARY").unwrap().columns, vec!["id"]);
    }

    #[tokio::test]
    async fn test_fake_parses_create_table_body() {
        let mut db = FakeDatabase::new();
        db.execute(
            "CREATE TABLE IF NOT EXISTS `server_ips` (\n  `ip_id` INT UNSIGNED NOT NULL AUTO_INCREMENT,\n  `ip_number` VARCHAR(45),\n  PRIMARY KEY (`ip_id`),\n  UNIQUE KEY `ip_number` (`ip_number`)\n)",
        )
        .await
        .unwrap();

        let table = db.table("server_ips").unwrap();
        assert_eq!(table.columns, vec!["ip_id", "ip_number"]);
        assert_eq!(table.indexes.len(), 2);
        assert!(db.index("server_ips", "ip_number").unwrap().unique);
    }

    #[tokio::test]
    async fn test_memory_store_write_failure() {
        let mut store = MemoryConfigStore::new().fail_writes_after(1);
        store.set("DATABASE_REVISION", "10").await.unwrap();
        assert!(store.set("DATABASE_REVISION", "11").await.is_err());
        assert_eq!(store.value("DATABASE_REVISION"), Some("10"));
    }
}
