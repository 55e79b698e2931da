//! Registry persistence for remote share records.
//!
//! The registry is a JSON document at a configurable path:
//!
//! ```json
//! { "version": 1, "shares": [ { "id": "...", "name": "media", "type": "smb", ... } ] }
//! ```
//!
//! # Concurrency Safety
//!
//! [`JsonFileRepository`] guards the document with an advisory lock on a
//! sibling `.lock` file, so CLI invocations racing each other see every
//! read-modify-write as a unit. Writes go to a temporary file in the same
//! directory which is then renamed over the registry, so readers never
//! observe a half-written file.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use netmount_core::RemoteShare;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How long to wait for another process to release the registry lock.
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll interval while waiting for the lock.
const LOCK_POLL: Duration = Duration::from_millis(50);

/// Current registry schema version.
const REGISTRY_VERSION: u32 = 1;

/// Registry access failures.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Reading, writing or locking the registry failed.
    #[error("Registry I/O error at {}: {source}", path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The registry file is not valid JSON of the expected shape.
    #[error("Failed to parse registry {}: {source}", path.display())]
    Parse {
        /// Registry path
        path: PathBuf,
        /// Parser error
        #[source]
        source: serde_json::Error,
    },

    /// Records could not be serialized.
    #[error("Failed to serialize registry: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Another process held the registry lock for too long.
    #[error(
        "Timed out waiting for registry lock {} after {timeout:?}; another netmount process may be holding it",
        path.display()
    )]
    LockTimeout {
        /// Lock file path
        path: PathBuf,
        /// Time waited
        timeout: Duration,
    },

    /// An update callback was never invoked.
    #[error("Registry update did not run")]
    Aborted,
}

/// Storage for the list of remote share records.
pub trait ShareRepository: Send + Sync {
    /// All records, in insertion order. A missing registry is empty.
    fn load(&self) -> Result<Vec<RemoteShare>, StoreError>;

    /// Read-modify-write under exclusive access.
    ///
    /// `update` is called exactly once with the current records and returns
    /// whether the (possibly modified) list should be persisted.
    fn update(
        &self,
        update: &mut dyn FnMut(&mut Vec<RemoteShare>) -> bool,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct RegistryDocument {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    shares: Vec<RemoteShare>,
}

fn default_version() -> u32 {
    REGISTRY_VERSION
}

/// Registry stored as a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonFileRepository {
    /// Use the registry at `path`; the lock lives next to it with a `.lock`
    /// extension.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = path.with_extension("lock");
        Self { path, lock_path }
    }

    /// Path of the registry document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
        move |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn acquire(&self, exclusive: bool) -> Result<File, StoreError> {
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(Self::io_error(parent))?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(Self::io_error(&self.lock_path))?;

        let start = Instant::now();
        loop {
            let attempt = if exclusive {
                lock_file.try_lock_exclusive()
            } else {
                FileExt::try_lock_shared(&lock_file)
            };
            match attempt {
                Ok(()) => return Ok(lock_file),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if start.elapsed() > LOCK_TIMEOUT {
                        return Err(StoreError::LockTimeout {
                            path: self.lock_path.clone(),
                            timeout: LOCK_TIMEOUT,
                        });
                    }
                    std::thread::sleep(LOCK_POLL);
                }
                Err(e) => return Err(Self::io_error(&self.lock_path)(e)),
            }
        }
    }

    fn read_unlocked(&self) -> Result<Vec<RemoteShare>, StoreError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io_error(&self.path)(e)),
        };
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        let document: RegistryDocument =
            serde_json::from_str(&contents).map_err(|source| StoreError::Parse {
                path: self.path.clone(),
                source,
            })?;
        if document.version != REGISTRY_VERSION {
            tracing::warn!(
                "Registry {} has schema version {}, expected {}",
                self.path.display(),
                document.version,
                REGISTRY_VERSION
            );
        }
        Ok(document.shares)
    }

    fn write_unlocked(&self, shares: &[RemoteShare]) -> Result<(), StoreError> {
        let document = RegistryDocument {
            version: REGISTRY_VERSION,
            shares: shares.to_vec(),
        };
        let contents = serde_json::to_vec_pretty(&document).map_err(StoreError::Serialize)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(Self::io_error(&dir))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(Self::io_error(&dir))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))
                .map_err(Self::io_error(tmp.path()))?;
        }
        tmp.write_all(&contents).map_err(Self::io_error(tmp.path()))?;
        tmp.as_file().sync_all().map_err(Self::io_error(tmp.path()))?;
        tmp.persist(&self.path)
            .map_err(|e| Self::io_error(&self.path)(e.error))?;

        tracing::debug!("Wrote {} share(s) to {}", shares.len(), self.path.display());
        Ok(())
    }
}

impl ShareRepository for JsonFileRepository {
    fn load(&self) -> Result<Vec<RemoteShare>, StoreError> {
        let lock = self.acquire(false)?;
        let shares = self.read_unlocked();
        let _ = FileExt::unlock(&lock);
        shares
    }

    fn update(
        &self,
        update: &mut dyn FnMut(&mut Vec<RemoteShare>) -> bool,
    ) -> Result<(), StoreError> {
        let lock = self.acquire(true)?;
        let result = self.read_unlocked().and_then(|mut shares| {
            if update(&mut shares) {
                self.write_unlocked(&shares)
            } else {
                Ok(())
            }
        });
        let _ = FileExt::unlock(&lock);
        result
    }
}

/// Registry held in memory, for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    shares: Mutex<Vec<RemoteShare>>,
}

impl InMemoryRepository {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with `shares`.
    pub fn with_shares(shares: Vec<RemoteShare>) -> Self {
        Self {
            shares: Mutex::new(shares),
        }
    }
}

impl ShareRepository for InMemoryRepository {
    fn load(&self) -> Result<Vec<RemoteShare>, StoreError> {
        Ok(self.shares.lock().clone())
    }

    fn update(
        &self,
        update: &mut dyn FnMut(&mut Vec<RemoteShare>) -> bool,
    ) -> Result<(), StoreError> {
        let mut guard = self.shares.lock();
        let mut working = guard.clone();
        if update(&mut working) {
            *guard = working;
        }
        Ok(())
    }
}
