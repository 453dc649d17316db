// src/state/lock.rs

//! Exclusive lock serializing installs and removals
//!
//! Every operation that reads and rewrites the installed-state log holds this
//! lock, so two cpkg processes never interleave their updates. The lock is an
//! advisory `flock` on `<work_dir>/cpkg.lock` and is released on drop.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::filesystem::create_dir_all;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Attempts before giving up on a held lock
const LOCK_ATTEMPTS: u32 = 50;

/// Delay between attempts
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Held state lock
pub struct StateLock {
    file: File,
    path: PathBuf,
}

impl StateLock {
    /// Acquire the lock for `config`'s work directory
    ///
    /// Waits a few seconds for another process to finish, then fails.
    pub fn acquire(config: &Config) -> Result<Self> {
        Self::acquire_at(config.lock_path())
    }

    /// Acquire an exclusive lock on an explicit path
    pub fn acquire_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| Error::IoError(format!("Failed to open lock file {}: {}", path.display(), e)))?;

        for attempt in 1..=LOCK_ATTEMPTS {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!("Acquired state lock at {}", path.display());
                    return Ok(Self { file, path });
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if attempt == 1 {
                        info!("Waiting for another cpkg process to release {}", path.display());
                    }
                    std::thread::sleep(LOCK_RETRY_DELAY);
                }
                Err(e) => {
                    return Err(Error::IoError(format!(
                        "Failed to lock {}: {}",
                        path.display(),
                        e
                    )));
                }
            }
        }

        Err(Error::IoError(format!(
            "Timed out waiting for lock {}; is another cpkg process running?",
            path.display()
        )))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!("Released state lock at {}", self.path.display());
    }
}
