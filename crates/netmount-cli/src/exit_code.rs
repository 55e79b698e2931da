//! Exit codes for the CLI.
//!
//! Each manager error category maps to a distinct code so scripts can tell
//! "not found" from "already mounted" from "tool failed".

/// Successful execution
pub const SUCCESS: u8 = 0;

/// General error, including registry I/O and lock timeouts
pub const GENERAL_ERROR: u8 = 1;

/// Invalid input (bad arguments or a field failing validation)
pub const USAGE_ERROR: u8 = 2;

/// Stored credential could not be decrypted, or no secret is configured
pub const CREDENTIAL_FAILED: u8 = 3;

/// Mount or unmount tool failed or timed out
pub const MOUNT_FAILED: u8 = 6;

/// No share with the given id
pub const NOT_FOUND: u8 = 7;

/// Duplicate name, shared mount point, or wrong mount state
pub const CONFLICT: u8 = 9;

/// Remote mounting is disabled in network settings
pub const FEATURE_DISABLED: u8 = 10;

/// Share discovery failed (unreachable server, refused, no shares)
pub const DISCOVERY_FAILED: u8 = 11;

/// A bulk operation finished with some failures
pub const PARTIAL_FAILURE: u8 = 12;
