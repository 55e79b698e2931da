//! Structural and semantic validation of share input.
//!
//! [`validate`] turns raw caller input into a [`ValidatedShare`] with typed
//! protocol, dialect and ownership fields. It never touches the registry;
//! uniqueness checks belong to the manager.

use std::net::Ipv4Addr;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::share::{NewShare, RemoteShare, ShareType, SmbVersion};

static HOSTNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9.-]*$").expect("hostname pattern is valid")
});

/// A share field failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {field}: {message}")]
pub struct ValidationError {
    /// Name of the offending field, as it appears in JSON
    pub field: &'static str,
    /// What is wrong with it
    pub message: String,
}

impl ValidationError {
    /// Build an error for `field`.
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Input that passed validation, normalised and typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedShare {
    /// Trimmed name
    pub name: String,
    /// Protocol
    pub share_type: ShareType,
    /// Trimmed server
    pub server: String,
    /// Trimmed share
    pub share: String,
    /// Username, `None` when blank
    pub username: Option<String>,
    /// Domain, SMB only
    pub domain: Option<String>,
    /// Dialect, always set for SMB
    pub version: Option<SmbVersion>,
    /// Owner uid
    pub uid: Option<u32>,
    /// Owner gid
    pub gid: Option<u32>,
    /// Mount after creation
    pub auto_mount: bool,
}

impl ValidatedShare {
    /// Turn into a persisted record carrying `password` (already encrypted).
    pub fn into_record(self, id: String, password: Option<String>) -> RemoteShare {
        RemoteShare {
            id,
            name: self.name,
            share_type: self.share_type,
            server: self.server,
            share: self.share,
            username: self.username,
            password,
            domain: self.domain,
            version: self.version,
            uid: self.uid,
            gid: self.gid,
            auto_mount: self.auto_mount,
        }
    }
}

/// Validate share input.
pub fn validate(input: &NewShare) -> Result<ValidatedShare, ValidationError> {
    let name = required(input.name.as_deref(), "name")?;
    let (share_type, server) =
        validate_endpoint(input.share_type.as_deref(), input.server.as_deref())?;
    let share = required(input.share.as_deref(), "share")?;

    let version = match (share_type, non_blank(input.version.as_deref())) {
        (ShareType::Smb, Some(v)) => Some(
            v.parse::<SmbVersion>()
                .map_err(|e| ValidationError::new("version", e))?,
        ),
        (ShareType::Smb, None) => Some(SmbVersion::default()),
        (ShareType::Nfs, Some(_)) => {
            return Err(ValidationError::new(
                "version",
                "a protocol version can only be set for SMB shares",
            ));
        }
        (ShareType::Nfs, None) => None,
    };

    let domain = match share_type {
        ShareType::Smb => option_value(input.domain.as_deref(), "domain")?,
        ShareType::Nfs => None,
    };

    Ok(ValidatedShare {
        name,
        share_type,
        server,
        share,
        username: option_value(input.username.as_deref(), "username")?,
        domain,
        version,
        uid: owner_id(input.uid, "uid")?,
        gid: owner_id(input.gid, "gid")?,
        auto_mount: input.auto_mount,
    })
}

/// Validate the protocol and server of a discovery request.
pub fn validate_endpoint(
    share_type: Option<&str>,
    server: Option<&str>,
) -> Result<(ShareType, String), ValidationError> {
    let share_type: ShareType = required(share_type, "type")?
        .parse()
        .map_err(|e: String| ValidationError::new("type", e))?;
    let server = required(server, "server")?;
    validate_server(&server)?;
    Ok((share_type, server))
}

/// Validate the subset of share input a connection test needs.
///
/// Returns `(type, server, share)`; name and ownership fields are ignored.
pub fn validate_probe(input: &NewShare) -> Result<(ShareType, String, String), ValidationError> {
    let (share_type, server) =
        validate_endpoint(input.share_type.as_deref(), input.server.as_deref())?;
    let share = required(input.share.as_deref(), "share")?;
    Ok((share_type, server, share))
}

/// Check a server address: an IPv4 literal or a hostname of alphanumerics,
/// dots and hyphens that starts with an alphanumeric.
pub fn validate_server(server: &str) -> Result<(), ValidationError> {
    if server.parse::<Ipv4Addr>().is_ok() || HOSTNAME_RE.is_match(server) {
        Ok(())
    } else {
        Err(ValidationError::new(
            "server",
            format!("'{server}' is not an IPv4 address or hostname"),
        ))
    }
}

fn required(value: Option<&str>, field: &'static str) -> Result<String, ValidationError> {
    non_blank(value).ok_or_else(|| ValidationError::new(field, "is required"))
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// A field that ends up inside a `mount -o` option list.
///
/// Commas and `=` would start a new option; the password is escaped instead
/// when the command is built.
fn option_value(
    value: Option<&str>,
    field: &'static str,
) -> Result<Option<String>, ValidationError> {
    let Some(value) = non_blank(value) else {
        return Ok(None);
    };
    if let Some(c) = value
        .chars()
        .find(|c| matches!(c, ',' | '=') || c.is_control())
    {
        return Err(ValidationError::new(field, format!("must not contain {c:?}")));
    }
    Ok(Some(value))
}

fn owner_id(value: Option<i64>, field: &'static str) -> Result<Option<u32>, ValidationError> {
    value
        .map(|id| {
            u32::try_from(id).map_err(|_| {
                ValidationError::new(field, format!("must be a non-negative integer, got {id}"))
            })
        })
        .transpose()
}
