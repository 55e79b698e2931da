//! Feature gate for remote mounting.
//!
//! Create, mount and auto-mount require the host's network settings to have
//! `services.remote_mounting.enabled` set. The flag is re-read on every query
//! so that toggling it takes effect without restarting anything.

use std::path::{Path, PathBuf};

/// JSON pointer of the gate inside the network settings document.
const REMOTE_MOUNTING_POINTER: &str = "/services/remote_mounting/enabled";

/// Source of the remote mounting gate.
pub trait FeatureFlags: Send + Sync {
    /// Whether remote mounting is currently enabled.
    fn remote_mounting_enabled(&self) -> bool;
}

/// Reads the gate from the network settings JSON file.
///
/// A missing file, unparseable JSON, or a missing/non-boolean key all mean
/// disabled.
#[derive(Debug, Clone)]
pub struct NetworkSettingsFlags {
    path: PathBuf,
}

impl NetworkSettingsFlags {
    /// Read settings from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Settings file location.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FeatureFlags for NetworkSettingsFlags {
    fn remote_mounting_enabled(&self) -> bool {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::debug!(
                    "Network settings {} unavailable ({}), remote mounting disabled",
                    self.path.display(),
                    e
                );
                return false;
            }
        };

        match serde_json::from_str::<serde_json::Value>(&contents) {
            Ok(settings) => settings
                .pointer(REMOTE_MOUNTING_POINTER)
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
            Err(e) => {
                tracing::warn!(
                    "Network settings {} is not valid JSON: {}",
                    self.path.display(),
                    e
                );
                false
            }
        }
    }
}

/// A fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct StaticFlags(pub bool);

impl FeatureFlags for StaticFlags {
    fn remote_mounting_enabled(&self) -> bool {
        self.0
    }
}
