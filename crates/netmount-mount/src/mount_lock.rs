//! Per-mount-point serialization.
//!
//! Mount and unmount probe the mount table and then act on it. Two callers
//! doing this for the same mount point at once could both see "unmounted"
//! and both mount. Each operation therefore holds an advisory lock on a file
//! named after the SHA-256 of the mount point for the probe-act sequence.
//! Update and delete hold the same lock around their registry write, always
//! taken before the registry lock.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::command::DEFAULT_COMMAND_TIMEOUT;

/// Slack on top of the command timeout when waiting for a busy mount point.
const LOCK_GRACE: Duration = Duration::from_secs(15);

/// Default wait for a busy mount point.
pub const DEFAULT_LOCK_TIMEOUT: Duration = lock_timeout_for(DEFAULT_COMMAND_TIMEOUT);

/// How long to wait for a mount point whose holder may be running one
/// external command bounded by `command_timeout`.
pub const fn lock_timeout_for(command_timeout: Duration) -> Duration {
    command_timeout.saturating_add(LOCK_GRACE)
}

/// Failure to serialize on a mount point.
#[derive(Error, Debug)]
pub enum LockError {
    /// Another operation kept the mount point busy.
    #[error("Another operation is in progress on {}", mount_point.display())]
    Busy {
        /// The contended mount point
        mount_point: PathBuf,
    },

    /// The lock file could not be created or locked.
    #[error("Failed to lock {}: {source}", path.display())]
    Io {
        /// Lock file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

/// Hands out per-mount-point locks stored under a directory.
#[derive(Debug, Clone)]
pub struct MountLocks {
    dir: PathBuf,
    timeout: Duration,
}

impl MountLocks {
    /// Store lock files under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Override how long to wait for a busy mount point.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// How long [`acquire`](Self::acquire) waits.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Lock file used for `mount_point`.
    pub fn lock_path(&self, mount_point: &Path) -> PathBuf {
        let digest = Sha256::digest(mount_point.as_os_str().as_encoded_bytes());
        self.dir.join(format!("{}.lock", hex::encode(digest)))
    }

    /// Block until `mount_point` is free, then hold it until the guard drops.
    pub fn acquire(&self, mount_point: &Path) -> Result<MountLockGuard, LockError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| LockError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.lock_path(mount_point);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| LockError::Io {
                path: path.clone(),
                source,
            })?;

        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    tracing::trace!("Locked {}", mount_point.display());
                    return Ok(MountLockGuard { file });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if start.elapsed() > self.timeout {
                        return Err(LockError::Busy {
                            mount_point: mount_point.to_path_buf(),
                        });
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(source) => return Err(LockError::Io { path, source }),
            }
        }
    }
}

/// Held lock on one mount point.
#[derive(Debug)]
pub struct MountLockGuard {
    file: File,
}

impl Drop for MountLockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
