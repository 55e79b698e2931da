//! The remote mount manager: CRUD and lifecycle for remote shares.
//!
//! Every public operation loads the registry, probes live mount state,
//! validates input and only then mutates through the store or the mount
//! tools. Nothing is cached between calls; the feature gate in particular is
//! re-read on each gated operation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use netmount_core::validation::{validate_endpoint, validate_probe};
use netmount_core::{
    CredentialCodec, CryptoError, MountPathResolver, MountStatus, NewShare, PASSWORD_SENTINEL,
    PasswordChange, RemoteShare, SharePatch, ShareView, ValidationError, new_share_id, validate,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;
use zeroize::Zeroizing;

use crate::command::CommandRunner;
use crate::discovery::{ConnectionReport, DiscoveryError, ProbeCredentials, ShareDiscovery};
use crate::flags::FeatureFlags;
use crate::mount_lock::{LockError, MountLocks};
use crate::mount_table::{MountProber, MountSnapshot};
use crate::orchestrator::{MountError, MountOrchestrator};
use crate::store::{ShareRepository, StoreError};

/// Errors returned by [`RemoteMountManager`].
#[derive(Error, Debug)]
pub enum Error {
    /// Input failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No share with this id.
    #[error("Remote share not found: {0}")]
    NotFound(String),

    /// Duplicate name, shared mount point or illegal state transition.
    #[error("{0}")]
    Conflict(String),

    /// Remote mounting is switched off in the network settings.
    #[error("Remote mounting is disabled in network settings")]
    FeatureDisabled,

    /// A stored credential needs the secret but none was configured.
    #[error("No credential secret configured (set NETMOUNT_SECRET)")]
    MissingSecret,

    /// Mount tool failure.
    #[error(transparent)]
    Mount(#[from] MountError),

    /// Stored credential could not be encrypted or decrypted.
    #[error(transparent)]
    Credential(#[from] CryptoError),

    /// Server refused or offered no shares.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Registry failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The mount point stayed busy.
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// Result alias for manager operations.
pub type Result<T> = std::result::Result<T, Error>;

/// One failed item of a bulk operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkFailure {
    /// Share id
    pub id: String,
    /// Share name
    pub name: String,
    /// Why it failed
    pub error: String,
}

/// Outcome of [`RemoteMountManager::unmount_all`] and
/// [`RemoteMountManager::mount_auto`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkReport {
    /// Shares acted on
    pub attempted: usize,
    /// Shares that succeeded
    pub succeeded: usize,
    /// Per-share failures
    pub failures: Vec<BulkFailure>,
}

impl BulkReport {
    /// Whether every attempt succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, share: &RemoteShare, outcome: Result<()>) {
        self.attempted += 1;
        match outcome {
            Ok(()) => self.succeeded += 1,
            Err(e) => {
                tracing::warn!("'{}' failed: {}", share.name, e);
                self.failures.push(BulkFailure {
                    id: share.id.clone(),
                    name: share.name.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
}

/// Everything the manager is composed of.
pub struct ManagerParts {
    /// Registry storage
    pub repository: Arc<dyn ShareRepository>,
    /// Live mount state
    pub prober: Arc<dyn MountProber>,
    /// Remote mounting gate
    pub flags: Arc<dyn FeatureFlags>,
    /// Executes mount and discovery tools
    pub runner: Arc<dyn CommandRunner>,
    /// Credential encryption; `None` when no secret is configured
    pub codec: Option<CredentialCodec>,
    /// Mount point layout
    pub resolver: MountPathResolver,
    /// Per-mount-point locks
    pub locks: MountLocks,
    /// Bound on each external command
    pub command_timeout: Duration,
}

/// Facade over registry, mount tools and discovery.
pub struct RemoteMountManager {
    repository: Arc<dyn ShareRepository>,
    prober: Arc<dyn MountProber>,
    flags: Arc<dyn FeatureFlags>,
    codec: Option<CredentialCodec>,
    resolver: MountPathResolver,
    locks: MountLocks,
    orchestrator: MountOrchestrator,
    discovery: ShareDiscovery,
}

impl RemoteMountManager {
    /// Assemble a manager.
    pub fn new(parts: ManagerParts) -> Self {
        Self {
            orchestrator: MountOrchestrator::new(parts.runner.clone(), parts.command_timeout),
            discovery: ShareDiscovery::new(parts.runner, parts.command_timeout),
            repository: parts.repository,
            prober: parts.prober,
            flags: parts.flags,
            codec: parts.codec,
            resolver: parts.resolver,
            locks: parts.locks,
        }
    }

    /// Whether remote mounting is currently enabled.
    pub fn remote_mounting_enabled(&self) -> bool {
        self.flags.remote_mounting_enabled()
    }

    /// All shares with live status, in registry order.
    #[instrument(level = "debug", skip(self))]
    pub fn list(&self) -> Result<Vec<ShareView>> {
        let shares = self.repository.load()?;
        let snapshot = self.prober.snapshot();
        Ok(shares
            .iter()
            .map(|share| self.view_with(share, &snapshot))
            .collect())
    }

    /// One share with live status.
    #[instrument(level = "debug", skip(self))]
    pub fn get(&self, id: &str) -> Result<ShareView> {
        let share = self.find(id)?;
        Ok(self.view(&share))
    }

    /// Register a new share, mounting it right away if `auto_mount` is set.
    ///
    /// A failed auto-mount is logged; the share stays registered.
    #[instrument(level = "info", skip(self, input), fields(name = ?input.name))]
    pub fn create(&self, input: NewShare) -> Result<ShareView> {
        self.require_enabled()?;
        let valid = validate(&input)?;

        let password = match input.password.as_deref() {
            Some(p) if !p.is_empty() => Some(self.codec()?.encrypt(p)?),
            _ => None,
        };
        let share = valid.into_record(new_share_id(), password);

        self.modify(|shares| {
            self.check_unique(shares, &share, None)?;
            shares.push(share.clone());
            Ok(())
        })?;
        tracing::info!(id = %share.id, "Created remote share '{}'", share.name);

        if share.auto_mount
            && let Err(e) = self.mount_share(&share)
        {
            tracing::warn!("Auto-mount of '{}' failed: {}", share.name, e);
        }
        Ok(self.view(&share))
    }

    /// Apply a partial update.
    ///
    /// Server, share and type are frozen while mounted. The stored password
    /// is kept unless the patch carries a new one (or an empty one, which
    /// clears it). Runs under the share's mount-point lock.
    #[instrument(level = "info", skip(self, patch))]
    pub fn update(&self, id: &str, patch: &SharePatch) -> Result<ShareView> {
        let mount_point = self.mount_point(&self.find(id)?);
        let _guard = self.locks.acquire(&mount_point)?;

        let updated = self.modify(|shares| {
            let index = position(shares, id)?;
            let current = &shares[index];
            if self.mount_point(current) != mount_point {
                return Err(changed_meanwhile(current));
            }

            if patch.changes_mount_identity(current) && self.prober.is_mounted(&mount_point) {
                return Err(Error::Conflict(format!(
                    "Cannot change server, share or type of '{}' while it is mounted",
                    current.name
                )));
            }

            let mut merged = NewShare::from_record(current);
            patch.apply_to(&mut merged);
            let valid = validate(&merged)?;

            let password = match patch.password_change() {
                PasswordChange::Keep => current.password.clone(),
                PasswordChange::Clear => None,
                PasswordChange::Set(new) => Some(self.codec()?.encrypt(new)?),
            };
            let share = valid.into_record(current.id.clone(), password);

            self.check_unique(shares, &share, Some(id))?;
            shares[index] = share.clone();
            Ok(share)
        })?;

        tracing::info!("Updated remote share '{}'", updated.name);
        Ok(self.view(&updated))
    }

    /// Remove an unmounted share and its leftover mount point directories.
    ///
    /// Waits for any mount or unmount in progress on the same mount point.
    #[instrument(level = "info", skip(self))]
    pub fn delete(&self, id: &str) -> Result<()> {
        let mount_point = self.mount_point(&self.find(id)?);
        let _guard = self.locks.acquire(&mount_point)?;

        let removed = self.modify(|shares| {
            let index = position(shares, id)?;
            if self.mount_point(&shares[index]) != mount_point {
                return Err(changed_meanwhile(&shares[index]));
            }
            if self.prober.is_mounted(&mount_point) {
                return Err(Error::Conflict(format!(
                    "Cannot delete '{}' while it is mounted; unmount it first",
                    shares[index].name
                )));
            }
            Ok(shares.remove(index))
        })?;

        self.orchestrator.cleanup(&mount_point);
        tracing::info!("Deleted remote share '{}'", removed.name);
        Ok(())
    }

    /// Mount a registered share.
    #[instrument(level = "info", skip(self))]
    pub fn mount(&self, id: &str) -> Result<ShareView> {
        self.require_enabled()?;
        let share = self.find(id)?;
        let share = self.mount_share(&share)?;
        Ok(self.view(&share))
    }

    /// Unmount a mounted share.
    #[instrument(level = "info", skip(self))]
    pub fn unmount(&self, id: &str) -> Result<ShareView> {
        let share = self.find(id)?;
        let share = self.unmount_share(&share)?;
        Ok(self.view(&share))
    }

    /// Unmount every mounted share, continuing past failures.
    #[instrument(level = "info", skip(self))]
    pub fn unmount_all(&self) -> Result<BulkReport> {
        let shares = self.repository.load()?;
        let snapshot = self.prober.snapshot();

        let mut report = BulkReport::default();
        for share in shares
            .iter()
            .filter(|s| snapshot.contains(&self.mount_point(s)))
        {
            report.record(share, self.unmount_share(share).map(drop));
        }
        tracing::info!(
            "Unmounted {}/{} remote share(s)",
            report.succeeded,
            report.attempted
        );
        Ok(report)
    }

    /// Mount every `auto_mount` share that is not mounted yet.
    #[instrument(level = "info", skip(self))]
    pub fn mount_auto(&self) -> Result<BulkReport> {
        self.require_enabled()?;
        let shares = self.repository.load()?;
        let snapshot = self.prober.snapshot();

        let mut report = BulkReport::default();
        for share in shares
            .iter()
            .filter(|s| s.auto_mount && !snapshot.contains(&self.mount_point(s)))
        {
            report.record(share, self.mount_share(share).map(drop));
        }
        tracing::info!(
            "Auto-mounted {}/{} remote share(s)",
            report.succeeded,
            report.attempted
        );
        Ok(report)
    }

    /// List what `server` offers over `share_type`.
    #[instrument(level = "info", skip(self, credentials))]
    pub fn list_server_shares(
        &self,
        server: &str,
        share_type: &str,
        credentials: &ProbeCredentials,
    ) -> Result<Vec<String>> {
        let (share_type, server) = validate_endpoint(Some(share_type), Some(server))?;
        Ok(self
            .discovery
            .list_shares(&server, share_type, credentials)?)
    }

    /// Check that unsaved share input can connect.
    #[instrument(level = "info", skip(self, input), fields(server = ?input.server))]
    pub fn connection_test(&self, input: &NewShare) -> Result<ConnectionReport> {
        let (share_type, server, share) = validate_probe(input)?;
        let credentials = ProbeCredentials {
            username: input.username.clone(),
            // The masked value means nothing without a stored record
            password: input
                .password
                .as_deref()
                .filter(|p| *p != PASSWORD_SENTINEL)
                .map(|p| Zeroizing::new(p.to_string())),
            domain: input.domain.clone(),
        };
        Ok(self
            .discovery
            .test_connection(&server, share_type, &share, &credentials))
    }

    /// Check that a registered share can connect with its stored credentials.
    #[instrument(level = "info", skip(self))]
    pub fn test_saved_connection(&self, id: &str) -> Result<ConnectionReport> {
        let share = self.find(id)?;
        let credentials = ProbeCredentials {
            username: share.username.clone(),
            password: self.decrypt_password(&share)?,
            domain: share.domain.clone(),
        };
        Ok(self.discovery.test_connection(
            &share.server,
            share.share_type,
            &share.share,
            &credentials,
        ))
    }

    /// Mount `share` under its mount-point lock.
    ///
    /// The record is re-read once the lock is held and returned as mounted.
    fn mount_share(&self, share: &RemoteShare) -> Result<RemoteShare> {
        let mount_point = self.mount_point(share);
        let _guard = self.locks.acquire(&mount_point)?;
        let share = self.reload(share, &mount_point)?;

        if self.prober.is_mounted(&mount_point) {
            return Err(Error::Conflict(format!(
                "'{}' is already mounted at {}",
                share.name,
                mount_point.display()
            )));
        }

        let password = self.decrypt_password(&share)?;
        self.orchestrator
            .mount(&share, &mount_point, password.as_ref().map(|p| p.as_str()))?;
        Ok(share)
    }

    fn unmount_share(&self, share: &RemoteShare) -> Result<RemoteShare> {
        let mount_point = self.mount_point(share);
        let _guard = self.locks.acquire(&mount_point)?;
        let share = self.reload(share, &mount_point)?;

        if !self.prober.is_mounted(&mount_point) {
            return Err(Error::Conflict(format!("'{}' is not mounted", share.name)));
        }
        self.orchestrator.unmount(&mount_point)?;
        tracing::info!("Unmounted '{}'", share.name);
        Ok(share)
    }

    /// Current registry record for `share`, which must still resolve to the
    /// locked mount point.
    fn reload(&self, share: &RemoteShare, locked: &Path) -> Result<RemoteShare> {
        let current = self.find(&share.id)?;
        if self.mount_point(&current) != locked {
            return Err(changed_meanwhile(&current));
        }
        Ok(current)
    }

    fn require_enabled(&self) -> Result<()> {
        if self.flags.remote_mounting_enabled() {
            Ok(())
        } else {
            Err(Error::FeatureDisabled)
        }
    }

    fn codec(&self) -> Result<&CredentialCodec> {
        self.codec.as_ref().ok_or(Error::MissingSecret)
    }

    fn decrypt_password(&self, share: &RemoteShare) -> Result<Option<Zeroizing<String>>> {
        match share.password.as_deref() {
            Some(token) if !token.is_empty() => Ok(Some(self.codec()?.decrypt(token)?)),
            _ => Ok(None),
        }
    }

    fn find(&self, id: &str) -> Result<RemoteShare> {
        self.repository
            .load()?
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn mount_point(&self, share: &RemoteShare) -> PathBuf {
        self.resolver.resolve(&share.server, &share.share)
    }

    fn view(&self, share: &RemoteShare) -> ShareView {
        let mount_point = self.mount_point(share);
        let status = if self.prober.is_mounted(&mount_point) {
            MountStatus::Mounted
        } else {
            MountStatus::Unmounted
        };
        ShareView::new(share, status, mount_point)
    }

    fn view_with(&self, share: &RemoteShare, snapshot: &MountSnapshot) -> ShareView {
        let mount_point = self.mount_point(share);
        ShareView::new(share, snapshot.status(&mount_point), mount_point)
    }

    /// Names are unique; since sanitising is lossy, so must be mount points.
    fn check_unique(
        &self,
        shares: &[RemoteShare],
        candidate: &RemoteShare,
        except_id: Option<&str>,
    ) -> Result<()> {
        let mount_point = self.mount_point(candidate);
        for other in shares.iter().filter(|s| Some(s.id.as_str()) != except_id) {
            if other.name == candidate.name {
                return Err(Error::Conflict(format!(
                    "A remote share named '{}' already exists",
                    candidate.name
                )));
            }
            if self.mount_point(other) == mount_point {
                return Err(Error::Conflict(format!(
                    "'{}' already uses mount point {}",
                    other.name,
                    mount_point.display()
                )));
            }
        }
        Ok(())
    }

    /// Read-modify-write under the registry lock; persisted only on `Ok`.
    fn modify<T>(&self, f: impl FnOnce(&mut Vec<RemoteShare>) -> Result<T>) -> Result<T> {
        let mut f = Some(f);
        let mut outcome = None;
        self.repository.update(&mut |shares| {
            let Some(f) = f.take() else {
                return false;
            };
            let result = f(shares);
            let persist = result.is_ok();
            outcome = Some(result);
            persist
        })?;
        outcome.unwrap_or_else(|| Err(StoreError::Aborted.into()))
    }
}

impl std::fmt::Debug for RemoteMountManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteMountManager")
            .field("resolver", &self.resolver)
            .field("codec", &self.codec)
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}

fn position(shares: &[RemoteShare], id: &str) -> Result<usize> {
    shares
        .iter()
        .position(|s| s.id == id)
        .ok_or_else(|| Error::NotFound(id.to_string()))
}

fn changed_meanwhile(share: &RemoteShare) -> Error {
    Error::Conflict(format!(
        "'{}' was changed by another operation; try again",
        share.name
    ))
}
