//! Remote share records and the shapes they travel in.
//!
//! - [`RemoteShare`] is what the registry persists (password as ciphertext token).
//! - [`NewShare`] is caller input for create, with raw values so validation can
//!   name the offending field.
//! - [`SharePatch`] is a partial update; every field is optional.
//! - [`ShareView`] is the read model: password masked, live status attached.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Fixed string returned in place of any stored password.
pub const PASSWORD_SENTINEL: &str = "SECRET";

/// Network file-sharing protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareType {
    /// SMB/CIFS, mounted with `mount -t cifs`
    Smb,
    /// NFS, mounted with `mount -t nfs`
    Nfs,
}

impl ShareType {
    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            ShareType::Smb => "smb",
            ShareType::Nfs => "nfs",
        }
    }
}

impl fmt::Display for ShareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShareType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "smb" => Ok(ShareType::Smb),
            "nfs" => Ok(ShareType::Nfs),
            other => Err(format!("unsupported share type '{other}' (expected smb or nfs)")),
        }
    }
}

/// SMB protocol dialect passed as `vers=` to mount.cifs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SmbVersion {
    /// SMB 1.0
    #[serde(rename = "1.0")]
    V1,
    /// SMB 2.0
    #[serde(rename = "2.0")]
    V2,
    /// SMB 3.0
    #[default]
    #[serde(rename = "3.0")]
    V3,
}

impl SmbVersion {
    /// Value as written in mount options.
    pub fn as_str(self) -> &'static str {
        match self {
            SmbVersion::V1 => "1.0",
            SmbVersion::V2 => "2.0",
            SmbVersion::V3 => "3.0",
        }
    }
}

impl fmt::Display for SmbVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SmbVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1.0" => Ok(SmbVersion::V1),
            "2.0" => Ok(SmbVersion::V2),
            "3.0" => Ok(SmbVersion::V3),
            other => Err(format!("unsupported SMB version '{other}' (expected 1.0, 2.0 or 3.0)")),
        }
    }
}

/// Live mount state, probed from the kernel mount table on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountStatus {
    /// The share's mount point is a mount target
    Mounted,
    /// The share's mount point is not mounted
    Unmounted,
}

impl MountStatus {
    /// Whether this is [`MountStatus::Mounted`].
    pub fn is_mounted(self) -> bool {
        self == MountStatus::Mounted
    }
}

impl fmt::Display for MountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MountStatus::Mounted => "mounted",
            MountStatus::Unmounted => "unmounted",
        })
    }
}

/// A persisted remote share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteShare {
    /// Opaque identifier assigned at creation
    pub id: String,
    /// Unique, trimmed display name
    pub name: String,
    /// Protocol
    #[serde(rename = "type")]
    pub share_type: ShareType,
    /// IPv4 literal or hostname
    pub server: String,
    /// Remote share name (SMB) or export path (NFS)
    pub share: String,
    /// Login name; absent means guest access
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Encrypted password token, see [`crate::crypto::CredentialCodec`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// SMB domain / workgroup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// SMB dialect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<SmbVersion>,
    /// Owner uid applied to the mounted tree
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    /// Owner gid applied to the mounted tree
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
    /// Mount immediately after creation
    #[serde(default)]
    pub auto_mount: bool,
}

impl RemoteShare {
    /// Whether a non-empty password token is stored.
    pub fn has_password(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// Caller input for creating a share.
///
/// Required fields are `Option` so that a missing field surfaces as a
/// validation error naming it rather than a deserialization failure.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewShare {
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// `smb` or `nfs`
    #[serde(default, rename = "type")]
    pub share_type: Option<String>,
    /// Server address
    #[serde(default)]
    pub server: Option<String>,
    /// Share name or export path
    #[serde(default)]
    pub share: Option<String>,
    /// Login name
    #[serde(default)]
    pub username: Option<String>,
    /// Plaintext password
    #[serde(default)]
    pub password: Option<String>,
    /// SMB domain
    #[serde(default)]
    pub domain: Option<String>,
    /// SMB dialect as text (`1.0`, `2.0`, `3.0`)
    #[serde(default)]
    pub version: Option<String>,
    /// Owner uid
    #[serde(default)]
    pub uid: Option<i64>,
    /// Owner gid
    #[serde(default)]
    pub gid: Option<i64>,
    /// Mount right after creation
    #[serde(default)]
    pub auto_mount: bool,
}

impl fmt::Debug for NewShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewShare")
            .field("name", &self.name)
            .field("share_type", &self.share_type)
            .field("server", &self.server)
            .field("share", &self.share)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("domain", &self.domain)
            .field("version", &self.version)
            .field("uid", &self.uid)
            .field("gid", &self.gid)
            .field("auto_mount", &self.auto_mount)
            .finish()
    }
}

impl NewShare {
    /// Raw form of a stored record, without its password, for re-validation.
    pub fn from_record(record: &RemoteShare) -> Self {
        Self {
            name: Some(record.name.clone()),
            share_type: Some(record.share_type.as_str().to_string()),
            server: Some(record.server.clone()),
            share: Some(record.share.clone()),
            username: record.username.clone(),
            password: None,
            domain: record.domain.clone(),
            version: record.version.map(|v| v.as_str().to_string()),
            uid: record.uid.map(i64::from),
            gid: record.gid.map(i64::from),
            auto_mount: record.auto_mount,
        }
    }
}

/// Partial update of a share.
///
/// `None` leaves a field untouched. For the nullable fields, `Some(None)`
/// (JSON `null`) clears the stored value. A password equal to
/// [`PASSWORD_SENTINEL`] is the masked value echoed back by a client and
/// leaves the credential unchanged; an empty password clears it.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharePatch {
    /// New name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New protocol
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub share_type: Option<String>,
    /// New server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    /// New share
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<String>,
    /// New or cleared username
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub username: Option<Option<String>>,
    /// New plaintext password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// New or cleared domain
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub domain: Option<Option<String>>,
    /// New or cleared SMB dialect
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub version: Option<Option<String>>,
    /// New or cleared uid
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub uid: Option<Option<i64>>,
    /// New or cleared gid
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub gid: Option<Option<i64>>,
    /// New auto-mount flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_mount: Option<bool>,
}

impl fmt::Debug for SharePatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharePatch")
            .field("name", &self.name)
            .field("share_type", &self.share_type)
            .field("server", &self.server)
            .field("share", &self.share)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("domain", &self.domain)
            .field("version", &self.version)
            .field("uid", &self.uid)
            .field("gid", &self.gid)
            .field("auto_mount", &self.auto_mount)
            .finish()
    }
}

/// How a patch wants the stored credential changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordChange<'a> {
    /// Keep the stored token
    Keep,
    /// Drop the stored token (guest access)
    Clear,
    /// Encrypt and store a new password
    Set(&'a str),
}

impl SharePatch {
    /// Whether the patch sets any of the fields that are frozen while mounted
    /// to a value different from `current`.
    pub fn changes_mount_identity(&self, current: &RemoteShare) -> bool {
        let server_changed = self
            .server
            .as_deref()
            .is_some_and(|s| s.trim() != current.server);
        let share_changed = self
            .share
            .as_deref()
            .is_some_and(|s| s.trim() != current.share);
        let type_changed = self
            .share_type
            .as_deref()
            .is_some_and(|t| t.parse::<ShareType>() != Ok(current.share_type));
        server_changed || share_changed || type_changed
    }

    /// Interpret the patch's password field.
    pub fn password_change(&self) -> PasswordChange<'_> {
        match self.password.as_deref() {
            None | Some(PASSWORD_SENTINEL) => PasswordChange::Keep,
            Some("") => PasswordChange::Clear,
            Some(new) => PasswordChange::Set(new),
        }
    }

    /// Apply the non-credential fields on top of `base`.
    pub fn apply_to(&self, base: &mut NewShare) {
        if let Some(name) = &self.name {
            base.name = Some(name.clone());
        }
        if let Some(share_type) = &self.share_type {
            // Switching to NFS drops SMB-only settings the patch does not mention
            if share_type.parse::<ShareType>() == Ok(ShareType::Nfs) {
                if self.version.is_none() {
                    base.version = None;
                }
                if self.domain.is_none() {
                    base.domain = None;
                }
            }
            base.share_type = Some(share_type.clone());
        }
        if let Some(server) = &self.server {
            base.server = Some(server.clone());
        }
        if let Some(share) = &self.share {
            base.share = Some(share.clone());
        }
        if let Some(username) = &self.username {
            base.username.clone_from(username);
        }
        if let Some(domain) = &self.domain {
            base.domain.clone_from(domain);
        }
        if let Some(version) = &self.version {
            base.version.clone_from(version);
        }
        if let Some(uid) = self.uid {
            base.uid = uid;
        }
        if let Some(gid) = self.gid {
            base.gid = gid;
        }
        if let Some(auto_mount) = self.auto_mount {
            base.auto_mount = auto_mount;
        }
    }
}

/// Read model returned by list/get.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareView {
    /// Identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Protocol
    #[serde(rename = "type")]
    pub share_type: ShareType,
    /// Server address
    pub server: String,
    /// Share name or export path
    pub share: String,
    /// Login name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Always [`PASSWORD_SENTINEL`]
    pub password: String,
    /// SMB domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// SMB dialect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<SmbVersion>,
    /// Owner uid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    /// Owner gid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
    /// Mount after creation
    pub auto_mount: bool,
    /// Live mount state
    pub status: MountStatus,
    /// Resolved local mount point
    pub mount_point: PathBuf,
}

impl ShareView {
    /// Mask a stored record and attach its live status.
    pub fn new(record: &RemoteShare, status: MountStatus, mount_point: PathBuf) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            share_type: record.share_type,
            server: record.server.clone(),
            share: record.share.clone(),
            username: record.username.clone(),
            password: PASSWORD_SENTINEL.to_string(),
            domain: record.domain.clone(),
            version: record.version,
            uid: record.uid,
            gid: record.gid,
            auto_mount: record.auto_mount,
            status,
            mount_point,
        }
    }
}
