//! Configuration file support for the netmount CLI.
//!
//! Configuration lives at `~/.config/netmount/config.toml` (XDG standard).
//! `NETMOUNT_CONFIG_DIR` relocates the whole directory; `--config` points at
//! a specific file. Every key is optional.
//!
//! # Example configuration
//!
//! ```toml
//! mount_base = "/mnt/remotes"
//! registry_path = "/var/lib/netmount/remotes.json"
//! network_settings_path = "/etc/netmount/network.json"
//! mount_table = "/proc/mounts"
//! lock_dir = "/run/netmount/locks"
//! command_timeout = "30s"
//!
//! [crypto]
//! kdf_log_n = 14
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use netmount_core::KdfParams;
use netmount_mount::command::DEFAULT_COMMAND_TIMEOUT;
use netmount_mount::mount_table::DEFAULT_MOUNT_TABLE;
use serde::{Deserialize, Serialize};

/// Environment variable overriding the configuration directory.
pub const CONFIG_DIR_ENV: &str = "NETMOUNT_CONFIG_DIR";

/// Default parent directory of all mount points.
const DEFAULT_MOUNT_BASE: &str = "/mnt/remotes";

/// Configuration file contents.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Parent directory of all mount points
    pub mount_base: PathBuf,

    /// Registry document; defaults to `<config dir>/remotes.json`
    pub registry_path: Option<PathBuf>,

    /// Network settings holding the remote mounting gate;
    /// defaults to `<config dir>/network.json`
    pub network_settings_path: Option<PathBuf>,

    /// Kernel mount table
    pub mount_table: PathBuf,

    /// Directory for per-mount-point lock files; defaults to `<config dir>/locks`
    pub lock_dir: Option<PathBuf>,

    /// Bound on every external command
    #[serde(with = "humantime_serde")]
    pub command_timeout: Duration,

    /// Credential encryption settings
    pub crypto: CryptoConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mount_base: PathBuf::from(DEFAULT_MOUNT_BASE),
            registry_path: None,
            network_settings_path: None,
            mount_table: PathBuf::from(DEFAULT_MOUNT_TABLE),
            lock_dir: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            crypto: CryptoConfig::default(),
        }
    }
}

/// `[crypto]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CryptoConfig {
    /// scrypt cost exponent (N = 2^kdf_log_n)
    pub kdf_log_n: u8,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            kdf_log_n: KdfParams::default().log_n,
        }
    }
}

impl CryptoConfig {
    /// KDF parameters with the configured cost.
    pub fn kdf_params(&self) -> KdfParams {
        KdfParams {
            log_n: self.kdf_log_n,
            ..KdfParams::default()
        }
    }
}

/// Configuration with every path resolved.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Parent directory of all mount points
    pub mount_base: PathBuf,
    /// Registry document
    pub registry_path: PathBuf,
    /// Network settings document
    pub network_settings_path: PathBuf,
    /// Kernel mount table
    pub mount_table: PathBuf,
    /// Lock directory
    pub lock_dir: PathBuf,
    /// Bound on every external command
    pub command_timeout: Duration,
    /// KDF parameters for the credential codec
    pub kdf: KdfParams,
}

impl Config {
    /// Load `explicit` if given, else `<config dir>/config.toml` if it exists,
    /// else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = config_dir()?.join("config.toml");
                if !path.exists() {
                    return Ok(Config::default());
                }
                path
            }
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Fill unset paths from the configuration directory.
    pub fn resolve(self) -> Result<Settings> {
        let dir = config_dir()?;
        Ok(Settings {
            mount_base: self.mount_base,
            registry_path: self
                .registry_path
                .unwrap_or_else(|| dir.join("remotes.json")),
            network_settings_path: self
                .network_settings_path
                .unwrap_or_else(|| dir.join("network.json")),
            mount_table: self.mount_table,
            lock_dir: self.lock_dir.unwrap_or_else(|| dir.join("locks")),
            command_timeout: self.command_timeout,
            kdf: self.crypto.kdf_params(),
        })
    }
}

/// The configuration directory.
///
/// `NETMOUNT_CONFIG_DIR` wins; otherwise the XDG config dir
/// (`~/.config/netmount` on Linux).
pub fn config_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let dirs = directories::ProjectDirs::from("", "", "netmount")
        .context("Failed to determine config directory")?;
    Ok(dirs.config_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.command_timeout, Duration::from_secs(30));
        assert_eq!(config.crypto.kdf_log_n, 14);
    }

    #[test]
    fn test_parse_full_file() {
        let config: Config = toml::from_str(
            r#"
            mount_base = "/srv/remotes"
            registry_path = "/var/lib/netmount/remotes.json"
            mount_table = "/tmp/mounts"
            command_timeout = "1m 30s"

            [crypto]
            kdf_log_n = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.mount_base, PathBuf::from("/srv/remotes"));
        assert_eq!(config.command_timeout, Duration::from_secs(90));
        assert_eq!(config.crypto.kdf_params().log_n, 10);
        assert_eq!(config.lock_dir, None);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(toml::from_str::<Config>("mount_bse = \"/x\"").is_err());
    }

    #[test]
    fn test_bad_timeout_rejected() {
        assert!(toml::from_str::<Config>("command_timeout = \"soon\"").is_err());
    }
}
