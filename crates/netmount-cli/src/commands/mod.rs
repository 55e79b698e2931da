pub mod discover;
pub mod mounts;
pub mod shares;

use std::sync::Arc;

use netmount_core::{CredentialCodec, MountPathResolver};
use netmount_mount::mount_lock::lock_timeout_for;
use netmount_mount::{
    JsonFileRepository, KernelMountTable, ManagerParts, MountLocks, NetworkSettingsFlags,
    RemoteMountManager, SystemCommandRunner,
};
use secrecy::SecretString;
use thiserror::Error;

use crate::config::Settings;

/// How results are printed.
#[derive(Debug, Clone, Copy)]
pub struct OutputMode {
    /// Machine-readable JSON on stdout
    pub json: bool,
    /// Suppress informational messages on stderr
    pub quiet: bool,
}

impl OutputMode {
    /// Print an informational line unless quiet or in JSON mode.
    pub fn note(&self, message: &str) {
        if !self.quiet && !self.json {
            eprintln!("{message}");
        }
    }
}

/// A bulk command finished but some shares failed.
#[derive(Error, Debug)]
#[error("{failed} of {attempted} share(s) failed")]
pub struct PartialFailure {
    /// Shares that failed
    pub failed: usize,
    /// Shares attempted
    pub attempted: usize,
}

/// A connection test ran but the server refused.
#[derive(Error, Debug)]
#[error("Connection test failed: {0}")]
pub struct ConnectionFailed(pub String);

/// Wire the manager to the host as configured.
pub fn build_manager(settings: &Settings, secret: Option<&str>) -> RemoteMountManager {
    let codec = secret
        .filter(|s| !s.is_empty())
        .map(|s| CredentialCodec::with_params(SecretString::from(s.to_string()), settings.kdf));

    RemoteMountManager::new(ManagerParts {
        repository: Arc::new(JsonFileRepository::new(&settings.registry_path)),
        prober: Arc::new(KernelMountTable::new(&settings.mount_table)),
        flags: Arc::new(NetworkSettingsFlags::new(&settings.network_settings_path)),
        runner: Arc::new(SystemCommandRunner),
        codec,
        resolver: MountPathResolver::new(&settings.mount_base),
        locks: mount_locks(settings),
        command_timeout: settings.command_timeout,
    })
}

/// Mount-point locks that wait out a holder running one external command.
fn mount_locks(settings: &Settings) -> MountLocks {
    MountLocks::new(&settings.lock_dir).with_timeout(lock_timeout_for(settings.command_timeout))
}
