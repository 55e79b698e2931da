//! Host-facing half of netmount: mount tools, the kernel mount table, the
//! registry file and the [`RemoteMountManager`] facade tying them together.
//!
//! # Architecture
//!
//! ```text
//! RemoteMountManager
//!   ├── ShareRepository   registry (JSON file or in-memory)
//!   ├── MountProber       live status from /proc/mounts
//!   ├── FeatureFlags      remote mounting gate from network settings
//!   ├── MountOrchestrator mount -t cifs|nfs, umount, mount point dirs
//!   ├── ShareDiscovery    smbclient, showmount, ping
//!   └── MountLocks        per-mount-point advisory locks
//! ```
//!
//! All host interaction goes through the [`CommandRunner`] and
//! [`MountProber`] traits; [`testing`] provides in-memory doubles for both.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod discovery;
pub mod flags;
pub mod manager;
pub mod mount_lock;
pub mod mount_table;
pub mod orchestrator;
pub mod store;
pub mod testing;

pub use command::{CommandError, CommandOutput, CommandRunner, SystemCommandRunner};
pub use discovery::{ConnectionReport, DiscoveryError, ProbeCredentials};
pub use flags::{FeatureFlags, NetworkSettingsFlags, StaticFlags};
pub use manager::{BulkFailure, BulkReport, Error, ManagerParts, RemoteMountManager, Result};
pub use mount_lock::{LockError, MountLocks};
pub use mount_table::{KernelMountTable, MountProber};
pub use orchestrator::MountError;
pub use store::{InMemoryRepository, JsonFileRepository, ShareRepository, StoreError};
