use anyhow::Result;
use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// Address nothing listens on, for tests that need a network call to fail fast
pub const UNREACHABLE_URL: &str = "http://127.0.0.1:9/releases/latest";

/// CLI test environment rooted in a temporary project directory
pub struct CliTestHelper {
    pub temp_dir: TempDir,
    pub project_root: PathBuf,
}

impl CliTestHelper {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let project_root = temp_dir.path().to_path_buf();

        Self {
            temp_dir,
            project_root,
        }
    }

    /// Command for the binary, running inside the project directory with a
    /// clean environment for the settings the tool reads
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("panel-migrate").expect("binary should be built");
        cmd.current_dir(&self.project_root)
            .env_remove("DATABASE_URL")
            .env_remove("RUST_LOG")
            .env_remove("RUST_BACKTRACE")
            .env_remove("RUST_LIB_BACKTRACE");
        cmd
    }

    pub fn write_config(&self, contents: &str) -> Result<()> {
        fs::write(self.project_root.join("panel-migrate.yaml"), contents)?;
        Ok(())
    }

    /// Write a release descriptor cache file and return its path
    pub fn write_release_cache(&self, name: &str, tag: &str) -> Result<PathBuf> {
        let path = self.project_root.join(name);
        let payload = serde_json::json!({
            "tag_name": tag,
            "html_url": format!("https://example.com/releases/{}", tag),
        });
        fs::write(&path, payload.to_string())?;
        Ok(path)
    }
}

impl Default for CliTestHelper {
    fn default() -> Self {
        Self::new()
    }
}

/// Backdate a file's modification time
pub fn age_file(path: &Path, age: Duration) -> Result<()> {
    let file = fs::File::options().write(true).open(path)?;
    file.set_modified(SystemTime::now() - age)?;
    Ok(())
}
