//! Core types for netmount, the remote share mount manager.
//!
//! This crate holds everything that does not touch the host:
//!
//! - [`share`] - persisted records, create/patch input and the masked read model
//! - [`validation`] - field validation producing typed, normalised records
//! - [`paths`] - injection-safe mapping of `(server, share)` to a mount point
//! - [`crypto`] - authenticated encryption of stored share passwords
//!
//! Host interaction (mount tools, the kernel mount table, the registry file)
//! lives in `netmount-mount`.
//!
//! # Example
//!
//! ```
//! use netmount_core::paths::MountPathResolver;
//! use netmount_core::share::NewShare;
//! use netmount_core::validation::validate;
//!
//! let input = NewShare {
//!     name: Some("media".into()),
//!     share_type: Some("smb".into()),
//!     server: Some("192.168.1.5".into()),
//!     share: Some("movies".into()),
//!     ..NewShare::default()
//! };
//! let share = validate(&input)?;
//!
//! let resolver = MountPathResolver::new("/mnt/remotes");
//! assert_eq!(
//!     resolver.resolve(&share.server, &share.share),
//!     std::path::Path::new("/mnt/remotes/192.168.1.5/movies")
//! );
//! # Ok::<(), netmount_core::validation::ValidationError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod crypto;
pub mod paths;
pub mod share;
pub mod validation;

pub use crypto::{CredentialCodec, CryptoError, KdfParams};
pub use paths::MountPathResolver;
pub use share::{
    MountStatus, NewShare, PASSWORD_SENTINEL, PasswordChange, RemoteShare, SharePatch,
    ShareType, ShareView, SmbVersion,
};
pub use validation::{
    ValidatedShare, ValidationError, validate, validate_endpoint, validate_probe,
};

/// Generate a fresh share identifier.
pub fn new_share_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
