//! Release check against a local descriptor cache; the remote is never reachable.

use crate::helpers::cli::{CliTestHelper, UNREACHABLE_URL, age_file};
use anyhow::Result;
use predicates::prelude::*;
use std::time::Duration;

fn release_config(cache_file: &str) -> String {
    format!(
        "release:\n  api_url: {}\n  cache_file: {}\n  freshness_hours: 24\n",
        UNREACHABLE_URL, cache_file
    )
}

#[test]
fn test_fresh_cache_reports_newer_release() -> Result<()> {
    let helper = CliTestHelper::new();
    helper.write_config(&release_config("release.json"))?;
    helper.write_release_cache("release.json", "1.5.3")?;

    helper
        .command()
        .args(["release", "--current-version", "1.5.0"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Current version: 1.5.0")
                .and(predicate::str::contains("Latest version:  1.5.3"))
                .and(predicate::str::contains("A new release is available"))
                .and(predicate::str::contains("https://example.com/releases/1.5.3")),
        );

    Ok(())
}

#[test]
fn test_current_release_is_up_to_date() -> Result<()> {
    let helper = CliTestHelper::new();
    helper.write_config(&release_config("release.json"))?;
    helper.write_release_cache("release.json", "1.5.3")?;

    helper
        .command()
        .args(["release", "--current-version", "1.5.3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No update available"));

    Ok(())
}

#[test]
fn test_unreleased_build_never_sees_an_update() -> Result<()> {
    let helper = CliTestHelper::new();
    helper.write_config(&release_config("release.json"))?;
    helper.write_release_cache("release.json", "1.5.3")?;

    helper
        .command()
        .args(["release", "--current-version", "git master"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Current version: 99")
                .and(predicate::str::contains("No update available")),
        );

    Ok(())
}

#[test]
fn test_stale_cache_with_unreachable_remote_fails() -> Result<()> {
    let helper = CliTestHelper::new();
    helper.write_config(&release_config("release.json"))?;
    let cache = helper.write_release_cache("release.json", "1.5.3")?;
    age_file(&cache, Duration::from_secs(2 * 24 * 3600))?;

    helper
        .command()
        .args(["release", "--current-version", "1.5.0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Couldn't get release info from"));

    // The stale copy survives a failed refresh
    assert!(cache.exists());
    Ok(())
}

#[test]
fn test_refresh_bypasses_fresh_cache() -> Result<()> {
    let helper = CliTestHelper::new();
    helper.write_config(&release_config("release.json"))?;
    helper.write_release_cache("release.json", "1.5.3")?;

    helper
        .command()
        .args(["release", "--refresh", "--current-version", "1.5.0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(UNREACHABLE_URL));

    Ok(())
}
