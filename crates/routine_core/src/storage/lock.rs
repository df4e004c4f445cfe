//! Per-owner write serialization.
//!
//! Every read-validate-write sequence for an owner runs while holding an
//! exclusive advisory lock on that owner's lock file. Locks are per open
//! file, so they serialize threads of one process as well as separate
//! processes. Different owners use different files and never contend.

use crate::error::AppError;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(20);

fn is_lock_contended(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }

    // Windows reports sharing/lock violations as raw os errors 32 and 33.
    #[cfg(windows)]
    {
        matches!(err.raw_os_error(), Some(32) | Some(33))
    }
    #[cfg(not(windows))]
    {
        false
    }
}

/// Exclusive lock guard; released when dropped.
#[derive(Debug)]
pub struct OwnerLock {
    file: File,
    path: PathBuf,
}

impl OwnerLock {
    /// Waits up to `timeout` for the lock, creating the lock file if needed.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::storage(err.to_string()))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|err| AppError::storage(format!("{}: {}", path.display(), err)))?;

        let started = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    tracing::debug!(
                        path = %path.display(),
                        waited_ms = started.elapsed().as_millis() as u64,
                        "owner lock acquired"
                    );
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(err) if is_lock_contended(&err) => {
                    if started.elapsed() >= timeout {
                        tracing::warn!(path = %path.display(), "timed out waiting for owner lock");
                        return Err(AppError::storage(format!(
                            "timed out waiting for lock {}",
                            path.display()
                        )));
                    }
                    std::thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(err) => {
                    return Err(AppError::storage(format!("{}: {}", path.display(), err)));
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OwnerLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
