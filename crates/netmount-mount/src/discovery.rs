//! Share discovery and connection testing.
//!
//! Neither operation touches the registry. Discovery lists what a server
//! offers (`smbclient -L` for SMB, `showmount -e` for NFS); a connection test
//! checks that one specific share is reachable with the given credentials.

use std::sync::Arc;
use std::time::Duration;

use netmount_core::ShareType;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::command::{CommandError, CommandOutput, CommandRunner};

/// Discovery failures.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// The server did not answer a liveness probe.
    #[error("Server {server} is not reachable")]
    Unreachable {
        /// Server probed
        server: String,
    },

    /// The listing tool reported failure (refused, bad credentials, ...).
    #[error("{tool} could not list shares on {server}: {detail}")]
    ToolFailed {
        /// Tool name
        tool: &'static str,
        /// Server probed
        server: String,
        /// The tool's diagnostic
        detail: String,
    },

    /// The server answered but offers nothing mountable.
    #[error("No shares found on {server}")]
    NoShares {
        /// Server probed
        server: String,
    },

    /// The tool could not be run or timed out.
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Credentials for a probe. The password is plaintext and wiped on drop.
#[derive(Clone, Default)]
pub struct ProbeCredentials {
    /// Login name; `None` probes as guest
    pub username: Option<String>,
    /// Plaintext password
    pub password: Option<Zeroizing<String>>,
    /// SMB workgroup
    pub domain: Option<String>,
}

impl ProbeCredentials {
    /// Guest access.
    pub fn guest() -> Self {
        Self::default()
    }

    /// Named user with a password.
    pub fn user(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(Zeroizing::new(password.into())),
            domain: None,
        }
    }

    fn smbclient_args(&self) -> Vec<String> {
        let Some(username) = self.username.as_deref().filter(|u| !u.is_empty()) else {
            return vec!["-N".to_string()];
        };

        let password = self.password.as_ref().map_or("", |p| p.as_str());
        let mut args = vec!["-U".to_string(), format!("{username}%{password}")];
        if let Some(domain) = self.domain.as_deref().filter(|d| !d.is_empty()) {
            args.push("-W".to_string());
            args.push(domain.to_string());
        }
        args
    }
}

impl std::fmt::Debug for ProbeCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeCredentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("domain", &self.domain)
            .finish()
    }
}

/// Outcome of a connection test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionReport {
    /// Whether the share is reachable
    pub success: bool,
    /// Human-readable explanation
    pub message: String,
}

impl ConnectionReport {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Runs discovery tools.
#[derive(Clone)]
pub struct ShareDiscovery {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl ShareDiscovery {
    /// Run tools through `runner`, each bounded by `timeout`.
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    /// List the shares (SMB) or exports (NFS) offered by `server`.
    pub fn list_shares(
        &self,
        server: &str,
        share_type: ShareType,
        credentials: &ProbeCredentials,
    ) -> Result<Vec<String>, DiscoveryError> {
        let shares = match share_type {
            ShareType::Smb => self.list_smb(server, credentials)?,
            ShareType::Nfs => self.list_nfs(server)?,
        };
        if shares.is_empty() {
            return Err(DiscoveryError::NoShares {
                server: server.to_string(),
            });
        }
        tracing::debug!("Found {} share(s) on {}", shares.len(), server);
        Ok(shares)
    }

    /// Check that `share` on `server` is reachable.
    ///
    /// Tool failures become an unsuccessful report rather than an error.
    pub fn test_connection(
        &self,
        server: &str,
        share_type: ShareType,
        share: &str,
        credentials: &ProbeCredentials,
    ) -> ConnectionReport {
        let report = match share_type {
            ShareType::Smb => self.test_smb(server, share, credentials),
            ShareType::Nfs => self.test_nfs(server, share),
        };
        tracing::info!(
            "Connection test {} {}/{}: {}",
            share_type,
            server,
            share,
            if report.success { "ok" } else { "failed" }
        );
        report
    }

    fn list_smb(
        &self,
        server: &str,
        credentials: &ProbeCredentials,
    ) -> Result<Vec<String>, DiscoveryError> {
        let mut argv = vec![
            "smbclient".to_string(),
            "-L".to_string(),
            format!("//{server}"),
            "-g".to_string(),
        ];
        argv.extend(credentials.smbclient_args());

        let output = self.runner.run(&argv, self.timeout)?;
        let shares = parse_smbclient_listing(&output.stdout);
        // smbclient exits non-zero when the IPC$ connection for workgroup
        // listing fails even though the share list itself came through
        if !output.success() && shares.is_empty() {
            return Err(DiscoveryError::ToolFailed {
                tool: "smbclient",
                server: server.to_string(),
                detail: smb_diagnostic(&output),
            });
        }
        Ok(shares)
    }

    fn list_nfs(&self, server: &str) -> Result<Vec<String>, DiscoveryError> {
        if !self.ping(server)? {
            return Err(DiscoveryError::Unreachable {
                server: server.to_string(),
            });
        }
        let output = self.showmount(server)?;
        if !output.success() {
            return Err(DiscoveryError::ToolFailed {
                tool: "showmount",
                server: server.to_string(),
                detail: output.diagnostic(),
            });
        }
        Ok(parse_showmount_exports(&output.stdout))
    }

    fn test_smb(&self, server: &str, share: &str, credentials: &ProbeCredentials) -> ConnectionReport {
        let mut argv = vec!["smbclient".to_string(), format!("//{server}/{share}")];
        argv.extend(credentials.smbclient_args());
        argv.push("-c".to_string());
        argv.push("ls".to_string());

        match self.runner.run(&argv, self.timeout) {
            Ok(output) if output.success() => {
                ConnectionReport::ok(format!("Connected to //{server}/{share}"))
            }
            Ok(output) => ConnectionReport::failed(format!(
                "Could not connect to //{server}/{share}: {}",
                smb_diagnostic(&output)
            )),
            Err(e) => ConnectionReport::failed(e.to_string()),
        }
    }

    fn test_nfs(&self, server: &str, share: &str) -> ConnectionReport {
        match self.ping(server) {
            Ok(true) => {}
            Ok(false) => return ConnectionReport::failed(format!("Server {server} is not reachable")),
            Err(e) => return ConnectionReport::failed(e.to_string()),
        }

        let exports = match self.showmount(server) {
            Ok(output) if output.success() => parse_showmount_exports(&output.stdout),
            Ok(output) => {
                tracing::debug!("showmount failed on {}: {}", server, output.diagnostic());
                return ConnectionReport::ok(format!(
                    "Server {server} is reachable (export list unavailable)"
                ));
            }
            Err(e) => {
                tracing::debug!("showmount could not run: {}", e);
                return ConnectionReport::ok(format!(
                    "Server {server} is reachable (export list unavailable)"
                ));
            }
        };

        if exports.iter().any(|e| e == share) {
            ConnectionReport::ok(format!("Export {share} is available on {server}"))
        } else {
            ConnectionReport::failed(format!("Export {share} not found on {server}"))
        }
    }

    fn ping(&self, server: &str) -> Result<bool, CommandError> {
        let argv = vec![
            "ping".to_string(),
            "-c".to_string(),
            "1".to_string(),
            "-W".to_string(),
            "2".to_string(),
            "--".to_string(),
            server.to_string(),
        ];
        Ok(self.runner.run(&argv, self.timeout)?.success())
    }

    fn showmount(&self, server: &str) -> Result<CommandOutput, CommandError> {
        let argv = vec![
            "showmount".to_string(),
            "-e".to_string(),
            "--no-headers".to_string(),
            "--".to_string(),
            server.to_string(),
        ];
        self.runner.run(&argv, self.timeout)
    }
}

impl std::fmt::Debug for ShareDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareDiscovery")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Disk share names from `smbclient -g` output (`Disk|name|comment`).
pub fn parse_smbclient_listing(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.trim().splitn(3, '|');
            match (fields.next(), fields.next()) {
                (Some("Disk"), Some(name)) if !name.is_empty() => Some(name.to_string()),
                _ => None,
            }
        })
        .collect()
}

/// Export paths from `showmount -e --no-headers` output.
pub fn parse_showmount_exports(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// smbclient prints `NT_STATUS_*` codes on stdout as often as on stderr.
fn smb_diagnostic(output: &CommandOutput) -> String {
    output
        .stdout
        .lines()
        .chain(output.stderr.lines())
        .find(|line| line.contains("NT_STATUS_"))
        .map_or_else(|| output.diagnostic(), |line| line.trim().to_string())
}
