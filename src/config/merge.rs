use crate::config::types::*;

/// Trait for merging optional configuration values
pub trait Merge<T> {
    fn merge(self, other: T) -> T;
}

impl<T> Merge<Option<T>> for Option<T> {
    fn merge(self, other: Option<T>) -> Option<T> {
        other.or(self)
    }
}

impl Merge<ConfigInput> for ConfigInput {
    fn merge(self, other: ConfigInput) -> ConfigInput {
        ConfigInput {
            database: match (self.database, other.database) {
                (None, None) => None,
                (Some(a), None) => Some(a),
                (None, Some(b)) => Some(b),
                (Some(a), Some(b)) => Some(a.merge_with(b)),
            },
            update: match (self.update, other.update) {
                (None, None) => None,
                (Some(a), None) => Some(a),
                (None, Some(b)) => Some(b),
                (Some(a), Some(b)) => Some(a.merge_with(b)),
            },
            release: match (self.release, other.release) {
                (None, None) => None,
                (Some(a), None) => Some(a),
                (None, Some(b)) => Some(b),
                (Some(a), Some(b)) => Some(a.merge_with(b)),
            },
            system: match (self.system, other.system) {
                (None, None) => None,
                (Some(a), None) => Some(a),
                (None, Some(b)) => Some(b),
                (Some(mut a), Some(b)) => {
                    a.extend(b);
                    Some(a)
                }
            },
        }
    }
}

// Custom merge implementations for complex types
impl DatabaseInput {
    pub fn merge_with(self, other: DatabaseInput) -> DatabaseInput {
        DatabaseInput {
            url: other.url.or(self.url),
        }
    }
}

impl UpdateInput {
    pub fn merge_with(self, other: UpdateInput) -> UpdateInput {
        UpdateInput {
            lock_file: other.lock_file.or(self.lock_file),
            config_table: other.config_table.or(self.config_table),
            watermark_key: other.watermark_key.or(self.watermark_key),
        }
    }
}

impl ReleaseInput {
    pub fn merge_with(self, other: ReleaseInput) -> ReleaseInput {
        ReleaseInput {
            api_url: other.api_url.or(self.api_url),
            cache_file: other.cache_file.or(self.cache_file),
            freshness_hours: other.freshness_hours.or(self.freshness_hours),
        }
    }
}
