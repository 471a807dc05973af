use crate::config::{merge::Merge, types::*};
use anyhow::{Result, anyhow};

pub struct ConfigBuilder {
    config_input: ConfigInput,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config_input: ConfigInput::default(),
        }
    }

    pub fn with_file(mut self, file_input: ConfigInput) -> Self {
        self.config_input = self.config_input.merge(file_input);
        self
    }

    pub fn with_cli_args(mut self, cli_input: ConfigInput) -> Self {
        self.config_input = self.config_input.merge(cli_input);
        self
    }

    pub fn resolve(self) -> Result<Config> {
        let defaults = Config::default();

        Ok(Config {
            database: self.resolve_database(&defaults.database),
            update: self.resolve_update(&defaults.update)?,
            release: self.resolve_release(&defaults.release)?,
            system: SystemSettings::new(self.config_input.system.clone().unwrap_or_default()),
        })
    }

    fn resolve_database(&self, defaults: &Database) -> Database {
        let db_input = self.config_input.database.as_ref();

        let url = db_input
            .and_then(|d| d.url.as_ref())
            .cloned()
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .or_else(|| defaults.url.clone());

        Database { url }
    }

    fn resolve_update(&self, defaults: &Update) -> Result<Update> {
        let update_input = self.config_input.update.as_ref();

        let config_table = update_input
            .and_then(|u| u.config_table.as_ref())
            .cloned()
            .unwrap_or_else(|| defaults.config_table.clone());

        if !is_valid_sql_identifier(&config_table) {
            return Err(anyhow!(
                "Invalid config table name '{}': must contain only letters, numbers and underscores, starting with a letter or underscore",
                config_table
            ));
        }

        Ok(Update {
            lock_file: update_input
                .and_then(|u| u.lock_file.as_ref())
                .cloned()
                .unwrap_or_else(|| defaults.lock_file.clone()),
            config_table,
            watermark_key: update_input
                .and_then(|u| u.watermark_key.as_ref())
                .cloned()
                .unwrap_or_else(|| defaults.watermark_key.clone()),
        })
    }

    fn resolve_release(&self, defaults: &Release) -> Result<Release> {
        let release_input = self.config_input.release.as_ref();

        let freshness_hours = release_input
            .and_then(|r| r.freshness_hours)
            .unwrap_or(defaults.freshness_hours);

        if freshness_hours == 0 {
            return Err(anyhow!(
                "release.freshness_hours must be at least 1 (the descriptor would be fetched on every check)"
            ));
        }

        Ok(Release {
            api_url: release_input
                .and_then(|r| r.api_url.as_ref())
                .cloned()
                .unwrap_or_else(|| defaults.api_url.clone()),
            cache_file: release_input
                .and_then(|r| r.cache_file.as_ref())
                .cloned()
                .unwrap_or_else(|| defaults.cache_file.clone()),
            freshness_hours,
        })
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// MySQL identifiers we are willing to interpolate unquoted-safe into SQL
pub fn is_valid_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
