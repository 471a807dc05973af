use crate::config::types::*;
use crate::constants::{
    DEFAULT_CONFIG_TABLE, DEFAULT_RELEASE_API_URL, DEFAULT_RELEASE_CACHE_FILE,
    DEFAULT_RELEASE_FRESHNESS_HOURS, DEFAULT_WATERMARK_KEY, LOCK_FILE_NAME,
};

// Config derives Default; Database has no default URL on purpose

impl Default for Update {
    fn default() -> Self {
        Self {
            lock_file: LOCK_FILE_NAME.to_string(),
            config_table: DEFAULT_CONFIG_TABLE.to_string(),
            watermark_key: DEFAULT_WATERMARK_KEY.to_string(),
        }
    }
}

impl Default for Release {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_RELEASE_API_URL.to_string(),
            cache_file: DEFAULT_RELEASE_CACHE_FILE.to_string(),
            freshness_hours: DEFAULT_RELEASE_FRESHNESS_HOURS,
        }
    }
}
