use anyhow::{Context, Result};
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;
use std::time::Duration;
use tracing::info;

/// Mask password in database URL for display
pub fn mask_url_password(url: &str) -> String {
    // Handle case where URL doesn't contain ://
    if !url.contains("://") {
        return url.to_string();
    }

    let parts: Vec<&str> = url.splitn(2, "://").collect();
    if parts.len() != 2 {
        return url.to_string();
    }

    let protocol = parts[0];
    let rest = parts[1];

    // Check if there's user info (user:pass@host or user@host)
    if let Some(at_pos) = rest.rfind('@') {
        let user_info = &rest[..at_pos];
        let host_and_path = &rest[at_pos + 1..];

        if let Some(colon_pos) = user_info.find(':') {
            let username = &user_info[..colon_pos];
            return format!("{}://{}:***@{}", protocol, username, host_and_path);
        }
    }

    url.to_string()
}

/// Database connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Maximum number of retries for database connections
    pub max_retries: u32,
    /// Delay between connection retries
    pub retry_delay: Duration,
    /// Upper bound for acquiring a connection from the pool
    pub acquire_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay: Duration::from_millis(200),
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Connect to the panel database with retry logic
///
/// The pool holds two connections at most: one session for the update steps and
/// one for the config store, whose watermark writes must not ride along with
/// whatever the step session is doing.
pub async fn connect_with_retry(url: &str) -> Result<MySqlPool> {
    connect_with_retry_config(url, &ConnectionConfig::default()).await
}

/// Connect to database with custom retry configuration
pub async fn connect_with_retry_config(url: &str, config: &ConnectionConfig) -> Result<MySqlPool> {
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        let result = MySqlPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(config.acquire_timeout)
            .connect(url)
            .await;

        match result {
            Ok(pool) => {
                if attempt > 0 {
                    info!(
                        "Connected to database (after {} retry{})",
                        attempt,
                        if attempt == 1 { "" } else { "ies" }
                    );
                } else {
                    info!("Connected to database");
                }
                return Ok(pool);
            }
            Err(e) => {
                last_error = Some(e);
                if attempt < config.max_retries {
                    if attempt == 0 {
                        info!("Database not ready, retrying...");
                    }
                    tokio::time::sleep(config.retry_delay).await;
                }
            }
        }
    }

    let cause = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no connection attempt was made".to_string());

    Err(anyhow::anyhow!(
        "Failed to connect to database at {} after {} attempts: {}",
        mask_url_password(url),
        config.max_retries + 1,
        cause
    ))
}

/// Check out the dedicated session used to run update steps
pub async fn acquire_session(pool: &MySqlPool) -> Result<crate::db::MySqlDatabase> {
    let conn = pool
        .acquire()
        .await
        .context("Failed to acquire a database session")?;

    Ok(crate::db::MySqlDatabase::new(conn))
}
