//! Software release check against a published "latest release" descriptor.
//!
//! The descriptor is cached on disk and refreshed once the cache is older than
//! the configured freshness window. After the first load it is kept in memory
//! for the lifetime of the checker.

use crate::constants::{RELEASE_REQUEST_TIMEOUT, RELEASE_USER_AGENT, UNRELEASED_VERSION};
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("Couldn't get release info from {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Release info request to {url} returned status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Invalid release info payload received from {origin}")]
    InvalidPayload {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Couldn't {action} release info file {}", .path.display())]
    Cache {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Couldn't build HTTP client")]
    Client(#[source] reqwest::Error),
}

/// The parts of the release descriptor we look at
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReleaseInfo {
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
}

pub struct ReleaseChecker {
    client: reqwest::Client,
    api_url: String,
    cache_file: PathBuf,
    freshness: Duration,
    current_version: String,
    info: Option<ReleaseInfo>,
}

impl ReleaseChecker {
    pub fn new(
        api_url: impl Into<String>,
        cache_file: impl Into<PathBuf>,
        freshness: Duration,
        current_version: Option<&str>,
    ) -> Result<Self, ReleaseError> {
        let client = reqwest::Client::builder()
            .timeout(RELEASE_REQUEST_TIMEOUT)
            .user_agent(RELEASE_USER_AGENT)
            .build()
            .map_err(ReleaseError::Client)?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            cache_file: cache_file.into(),
            freshness,
            current_version: normalize_current_version(current_version),
            info: None,
        })
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    /// Release descriptor, from memory, the cache file, or the network (in that order)
    pub async fn release_info(&mut self, force_reload: bool) -> Result<&ReleaseInfo, ReleaseError> {
        if force_reload || self.info.is_none() {
            let info = self.load(force_reload).await?;
            self.info = Some(info);
        }

        Ok(self.info.get_or_insert_with(ReleaseInfo::default))
    }

    /// Tag of the latest published release, or the running version when the
    /// descriptor carries no tag
    pub async fn latest_known_version(&mut self) -> Result<String, ReleaseError> {
        let current = self.current_version.clone();
        let info = self.release_info(false).await?;

        Ok(info.tag_name.clone().unwrap_or(current))
    }

    pub async fn is_update_available(&mut self) -> Result<bool, ReleaseError> {
        let latest = self.latest_known_version().await?;
        Ok(compare_versions(&latest, &self.current_version) == Ordering::Greater)
    }

    async fn load(&self, force_reload: bool) -> Result<ReleaseInfo, ReleaseError> {
        if !force_reload && cache_is_fresh(&self.cache_file, self.freshness) {
            debug!("Using cached release info from {}", self.cache_file.display());
            let payload = fs::read_to_string(&self.cache_file).map_err(|source| {
                ReleaseError::Cache {
                    action: "load",
                    path: self.cache_file.clone(),
                    source,
                }
            })?;
            return parse_payload(&payload, &self.cache_file.display().to_string());
        }

        info!("Fetching release info from {}", self.api_url);
        let payload = self.fetch().await?;
        let info = parse_payload(&payload, &self.api_url)?;
        self.store(&payload)?;

        Ok(info)
    }

    async fn fetch(&self) -> Result<String, ReleaseError> {
        let response = self
            .client
            .get(&self.api_url)
            .header(ACCEPT, "application/vnd.github.v3+json")
            .send()
            .await
            .map_err(|e| ReleaseError::Fetch {
                url: self.api_url.clone(),
                message: if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    e.to_string()
                },
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReleaseError::Status {
                url: self.api_url.clone(),
                status,
            });
        }

        response.text().await.map_err(|e| ReleaseError::Fetch {
            url: self.api_url.clone(),
            message: e.to_string(),
        })
    }

    /// Replace the cache file with a freshly fetched payload
    fn store(&self, payload: &str) -> Result<(), ReleaseError> {
        let cache_error = |action, source| ReleaseError::Cache {
            action,
            path: self.cache_file.clone(),
            source,
        };

        if let Some(parent) = self.cache_file.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| cache_error("create directory for", e))?;
        }

        if self.cache_file.exists() {
            fs::remove_file(&self.cache_file).map_err(|e| cache_error("delete", e))?;
        }

        fs::write(&self.cache_file, payload).map_err(|e| cache_error("create", e))
    }
}

/// Whether the cache file exists and was written within the freshness window
fn cache_is_fresh(path: &Path, freshness: Duration) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.checked_add(freshness))
        .is_some_and(|expires| expires >= SystemTime::now())
}

/// Any JSON document is accepted; a non-object or oddly typed one simply has no tag
fn parse_payload(payload: &str, origin: &str) -> Result<ReleaseInfo, ReleaseError> {
    let value: serde_json::Value =
        serde_json::from_str(payload).map_err(|source| ReleaseError::InvalidPayload {
            origin: origin.to_string(),
            source,
        })?;

    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// The running version, with unreleased builds (git checkouts, unknown) reported as "99"
pub fn normalize_current_version(version: Option<&str>) -> String {
    match version.map(str::trim) {
        Some(v) if !v.is_empty() && !v.to_ascii_lowercase().contains("git") => v.to_string(),
        _ => UNRELEASED_VERSION.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Number(u64),
    Word(String),
}

impl Part {
    /// Pre-release words sort below numbers, patch-level words above
    fn rank(&self) -> u8 {
        match self {
            Part::Number(_) => 5,
            Part::Word(w) => match w.to_ascii_lowercase().as_str() {
                "dev" => 1,
                "alpha" | "a" => 2,
                "beta" | "b" => 3,
                "rc" => 4,
                "pl" | "p" => 6,
                _ => 0,
            },
        }
    }
}

fn version_parts(version: &str) -> Vec<Part> {
    let version = version.trim().trim_start_matches(['v', 'V']);
    let mut parts = Vec::new();
    let mut current = String::new();

    let mut flush = |current: &mut String| {
        if current.is_empty() {
            return;
        }
        let part = current
            .parse::<u64>()
            .map_or_else(|_| Part::Word(current.clone()), Part::Number);
        parts.push(part);
        current.clear();
    };

    for c in version.chars() {
        if matches!(c, '.' | '-' | '_' | '+') {
            flush(&mut current);
            continue;
        }
        if let Some(last) = current.chars().last()
            && last.is_ascii_digit() != c.is_ascii_digit()
        {
            flush(&mut current);
        }
        current.push(c);
    }
    flush(&mut current);

    parts
}

fn compare_parts(a: &Part, b: &Part) -> Ordering {
    match (a, b) {
        (Part::Number(x), Part::Number(y)) => x.cmp(y),
        _ => a.rank().cmp(&b.rank()),
    }
}

/// Compare two version strings component by component (`1.5.3` < `1.5.10`,
/// `1.5.3-rc1` < `1.5.3`, leading `v` ignored)
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (a, b) = (version_parts(a), version_parts(b));

    for idx in 0..a.len().max(b.len()) {
        let ordering = match (a.get(idx), b.get(idx)) {
            (Some(x), Some(y)) => compare_parts(x, y),
            (Some(Part::Number(_)), None) => Ordering::Greater,
            (None, Some(Part::Number(_))) => Ordering::Less,
            (Some(x), None) => x.rank().cmp(&Part::Number(0).rank()),
            (None, Some(y)) => Part::Number(0).rank().cmp(&y.rank()),
            (None, None) => Ordering::Equal,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}
