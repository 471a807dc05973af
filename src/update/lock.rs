use crate::constants::LOCK_FILE_STALE_TIMEOUT;
use anyhow::{Context, Result, anyhow};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Guards against two update runs touching the same database at once.
///
/// Held for the whole run, gate included. While held, the lock file's
/// modification time is refreshed well within the stale timeout, so a long
/// run is never mistaken for an abandoned one. On drop the file is removed
/// only if it is still the one this lock wrote.
#[derive(Debug)]
pub struct UpdateLock {
    lock_file_path: PathBuf,
    contents: String,
    heartbeat: Option<(Sender<()>, JoinHandle<()>)>,
}

impl UpdateLock {
    pub fn acquire(lock_file_path: &Path) -> Result<Self> {
        Self::acquire_with_timeout(lock_file_path, LOCK_FILE_STALE_TIMEOUT)
    }

    pub fn acquire_with_timeout(lock_file_path: &Path, stale_after: Duration) -> Result<Self> {
        if let Some(parent) = lock_file_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create lock directory {}", parent.display())
            })?;
        }

        let mut lock = match Self::create(lock_file_path) {
            Ok(lock) => lock,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if !is_stale(lock_file_path, stale_after) {
                    return Err(anyhow!(
                        "Another database update is currently running.\n\nIf you're sure no other update is running, remove: {}",
                        lock_file_path.display()
                    ));
                }

                warn!(
                    "Removing stale lock file {} (older than {} seconds)",
                    lock_file_path.display(),
                    stale_after.as_secs()
                );
                let _ = fs::remove_file(lock_file_path);
                Self::create(lock_file_path).with_context(|| {
                    format!("Failed to create lock file {}", lock_file_path.display())
                })?
            }
            Err(e) => {
                return Err(anyhow!(
                    "Failed to create lock file {}: {}",
                    lock_file_path.display(),
                    e
                ));
            }
        };

        lock.start_heartbeat((stale_after / 4).max(Duration::from_millis(1)));
        Ok(lock)
    }

    fn create(lock_file_path: &Path) -> std::io::Result<Self> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_file_path)?;

        let now = chrono::Utc::now();
        let contents = format!(
            "PID: {}\nStarted: {}\nToken: {}",
            std::process::id(),
            now.format("%Y-%m-%d %H:%M:%S UTC"),
            now.timestamp_nanos_opt().unwrap_or_default()
        );
        file.write_all(contents.as_bytes())?;

        Ok(Self {
            lock_file_path: lock_file_path.to_path_buf(),
            contents,
            heartbeat: None,
        })
    }

    /// Touch the lock file every `every` until the lock is dropped
    fn start_heartbeat(&mut self, every: Duration) {
        let (stop, stopped) = mpsc::channel::<()>();
        let path = self.lock_file_path.clone();
        let contents = self.contents.clone();

        let handle = std::thread::spawn(move || {
            while let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(every) {
                if !is_owned(&path, &contents) {
                    warn!("Lock file {} was replaced by another run", path.display());
                    return;
                }
                if let Err(e) = touch(&path) {
                    debug!("Failed to refresh lock file {}: {}", path.display(), e);
                }
            }
        });

        self.heartbeat = Some((stop, handle));
    }

    pub fn path(&self) -> &Path {
        &self.lock_file_path
    }
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|elapsed| elapsed > stale_after)
}

fn is_owned(path: &Path, contents: &str) -> bool {
    fs::read_to_string(path).is_ok_and(|current| current == contents)
}

fn touch(path: &Path) -> std::io::Result<()> {
    OpenOptions::new()
        .write(true)
        .open(path)?
        .set_modified(SystemTime::now())
}

impl Drop for UpdateLock {
    fn drop(&mut self) {
        if let Some((stop, handle)) = self.heartbeat.take() {
            drop(stop);
            let _ = handle.join();
        }

        if is_owned(&self.lock_file_path, &self.contents) {
            let _ = fs::remove_file(&self.lock_file_path);
        } else {
            warn!(
                "Lock file {} belongs to another run; leaving it in place",
                self.lock_file_path.display()
            );
        }
    }
}
