//! Deterministic mount point layout.
//!
//! Every share mounts at `<base>/<server>/<share>` where both components are
//! sanitised so that neither can contain a path separator nor be `.`/`..`.

use std::path::{Path, PathBuf};

/// Replacement for any character outside the allow-list.
const REPLACEMENT: char = '_';

/// Maps `(server, share)` pairs to mount points under a fixed base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPathResolver {
    base: PathBuf,
}

impl MountPathResolver {
    /// Create a resolver rooted at `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// The base directory all mount points live under.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Mount point for a share.
    pub fn resolve(&self, server: &str, share: &str) -> PathBuf {
        self.server_dir(server).join(sanitize_share(share))
    }

    /// Directory grouping all shares of one server.
    pub fn server_dir(&self, server: &str) -> PathBuf {
        self.base.join(sanitize_server(server))
    }
}

/// Keep `[A-Za-z0-9.-]`, replace the rest.
pub fn sanitize_server(server: &str) -> String {
    let sanitized = sanitize(server, |c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    // "." and ".." survive the allow-list but must never become path components
    if sanitized.chars().all(|c| c == '.') {
        sanitized.chars().map(|_| REPLACEMENT).collect()
    } else {
        sanitized
    }
}

/// Keep `[A-Za-z0-9_-]`, replace the rest.
pub fn sanitize_share(share: &str) -> String {
    sanitize(share, |c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn sanitize(input: &str, allowed: impl Fn(char) -> bool) -> String {
    let sanitized: String = input
        .chars()
        .map(|c| if allowed(c) { c } else { REPLACEMENT })
        .collect();
    if sanitized.is_empty() {
        REPLACEMENT.to_string()
    } else {
        sanitized
    }
}
