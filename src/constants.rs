use std::time::Duration;

// Lock file management
pub const LOCK_FILE_STALE_TIMEOUT: Duration = Duration::from_secs(600);
pub const LOCK_FILE_NAME: &str = ".panel_migrate.lock";

// Configuration file name
pub const CONFIG_FILENAME: &str = "panel-migrate.yaml";

// Config store layout
pub const DEFAULT_CONFIG_TABLE: &str = "config";
pub const DEFAULT_WATERMARK_KEY: &str = "DATABASE_REVISION";
pub const VERSION_KEY: &str = "Version";

// Release check
pub const DEFAULT_RELEASE_API_URL: &str =
    "https://api.github.com/repos/i-MSCP/imscp/releases/latest";
pub const DEFAULT_RELEASE_CACHE_FILE: &str = "cache/release_info.json";
pub const DEFAULT_RELEASE_FRESHNESS_HOURS: u64 = 24;
pub const RELEASE_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const RELEASE_USER_AGENT: &str = "panel-migrate";

/// Version reported for builds that were never released (e.g. a git checkout)
pub const UNRELEASED_VERSION: &str = "99";
