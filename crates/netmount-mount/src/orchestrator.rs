//! Drives the host mount tools.
//!
//! SMB shares mount through `mount -t cifs`, NFS exports through
//! `mount -t nfs`. Passwords only ever appear in the argv handed to the
//! runner; everything logged uses a copy with the password masked.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use netmount_core::{RemoteShare, ShareType};
use thiserror::Error;

use crate::command::{CommandError, CommandOutput, CommandRunner};

/// Mask used for passwords in logged command lines.
const REDACTED: &str = "***";

/// Fixed NFS client options.
const NFS_OPTIONS: &str = "vers=4,rsize=1048576,wsize=1048576,hard,intr,timeo=600";

/// Mount or unmount failures.
#[derive(Error, Debug)]
pub enum MountError {
    /// The mount point directory could not be created.
    #[error("Failed to create mount point {}: {source}", path.display())]
    MountPoint {
        /// Directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The tool ran and reported failure.
    #[error("{tool} failed ({}): {detail}", describe_exit(*exit_code))]
    CommandFailed {
        /// Tool name
        tool: String,
        /// Exit code, `None` when killed by a signal
        exit_code: Option<i32>,
        /// The tool's own diagnostic
        detail: String,
    },

    /// The tool could not be run or timed out.
    #[error(transparent)]
    Command(#[from] CommandError),
}

fn describe_exit(exit_code: Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// A command line plus a copy that is safe to log.
#[derive(Clone, PartialEq, Eq)]
pub struct MountCommand {
    argv: Vec<String>,
    display: Vec<String>,
}

impl MountCommand {
    /// The real argv.
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// The argv with credentials masked.
    pub fn redacted(&self) -> String {
        self.display.join(" ")
    }
}

impl std::fmt::Debug for MountCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// Build the mount command for `share` at `mount_point`.
///
/// `password` is the decrypted credential; SMB mounts fall back to guest
/// access when no username or no password is available.
pub fn mount_command(share: &RemoteShare, mount_point: &Path, password: Option<&str>) -> MountCommand {
    let target = mount_point.to_string_lossy().into_owned();

    match share.share_type {
        ShareType::Smb => {
            let source = format!("//{}/{}", share.server, share.share);
            let password = password.filter(|p| !p.is_empty());
            let masked = password.map(|_| REDACTED);
            MountCommand {
                argv: cifs_argv(&source, &target, smb_options(share, password)),
                display: cifs_argv(&source, &target, smb_options(share, masked)),
            }
        }
        ShareType::Nfs => {
            let mut options = NFS_OPTIONS.to_string();
            push_owner_options(&mut options, share);
            let argv = vec![
                "mount".to_string(),
                "-t".to_string(),
                "nfs".to_string(),
                "-o".to_string(),
                options,
                format!("{}:{}", share.server, share.share),
                target,
            ];
            MountCommand {
                display: argv.clone(),
                argv,
            }
        }
    }
}

fn cifs_argv(source: &str, target: &str, options: String) -> Vec<String> {
    vec![
        "mount".to_string(),
        "-t".to_string(),
        "cifs".to_string(),
        source.to_string(),
        target.to_string(),
        "-o".to_string(),
        options,
    ]
}

fn smb_options(share: &RemoteShare, password: Option<&str>) -> String {
    let version = share.version.unwrap_or_default();
    let credentials = share.username.as_deref().zip(password);

    let mut options = match credentials {
        Some((username, password)) => {
            // mount.cifs reads a doubled comma as a literal comma
            let mut options = format!(
                "username={username},password={},vers={version}",
                password.replace(',', ",,")
            );
            if let Some(domain) = &share.domain {
                options.push_str(&format!(",domain={domain}"));
            }
            options
        }
        None => format!("guest,vers={version}"),
    };
    push_owner_options(&mut options, share);
    options
}

fn push_owner_options(options: &mut String, share: &RemoteShare) {
    if let Some(uid) = share.uid {
        options.push_str(&format!(",uid={uid}"));
    }
    if let Some(gid) = share.gid {
        options.push_str(&format!(",gid={gid}"));
    }
}

/// Executes mount and unmount commands and manages mount point directories.
#[derive(Clone)]
pub struct MountOrchestrator {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl MountOrchestrator {
    /// Run tools through `runner`, each bounded by `timeout`.
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    /// Create the mount point and mount `share` on it.
    pub fn mount(
        &self,
        share: &RemoteShare,
        mount_point: &Path,
        password: Option<&str>,
    ) -> Result<(), MountError> {
        std::fs::create_dir_all(mount_point).map_err(|source| MountError::MountPoint {
            path: mount_point.to_path_buf(),
            source,
        })?;

        let command = mount_command(share, mount_point, password);
        tracing::debug!(
            "Mounting {} share '{}': {}",
            share.share_type,
            share.name,
            command.redacted()
        );

        let result = self
            .runner
            .run(command.argv(), self.timeout)
            .map_err(MountError::from)
            .and_then(|output| check("mount", &output));
        if let Err(e) = result {
            self.cleanup(mount_point);
            return Err(e);
        }
        tracing::info!("Mounted '{}' at {}", share.name, mount_point.display());
        Ok(())
    }

    /// Unmount `mount_point`, then remove the directories created for it.
    pub fn unmount(&self, mount_point: &Path) -> Result<(), MountError> {
        let argv = vec![
            "umount".to_string(),
            mount_point.to_string_lossy().into_owned(),
        ];
        tracing::info!("Unmounting {}", mount_point.display());

        let output = self.runner.run(&argv, self.timeout)?;
        check("umount", &output)?;
        self.cleanup(mount_point);
        Ok(())
    }

    /// Best-effort removal of an empty mount point and its server directory
    /// if that is now empty too.
    pub fn cleanup(&self, mount_point: &Path) {
        if !remove_empty_dir(mount_point) {
            return;
        }
        if let Some(server_dir) = mount_point.parent() {
            remove_empty_dir(server_dir);
        }
    }
}

impl std::fmt::Debug for MountOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountOrchestrator")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Remove `dir` if it exists and is empty. Returns whether it is gone.
fn remove_empty_dir(dir: &Path) -> bool {
    match std::fs::remove_dir(dir) {
        Ok(()) => {
            tracing::debug!("Removed {}", dir.display());
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => {
            tracing::debug!("Leaving {} in place: {}", dir.display(), e);
            false
        }
    }
}

fn check(tool: &str, output: &CommandOutput) -> Result<(), MountError> {
    if output.success() {
        Ok(())
    } else {
        Err(MountError::CommandFailed {
            tool: tool.to_string(),
            exit_code: output.exit_code,
            detail: output.diagnostic(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netmount_core::SmbVersion;

    fn smb_share() -> RemoteShare {
        RemoteShare {
            id: "1".to_string(),
            name: "media".to_string(),
            share_type: ShareType::Smb,
            server: "192.168.1.5".to_string(),
            share: "movies".to_string(),
            username: Some("alice".to_string()),
            password: Some("token".to_string()),
            domain: None,
            version: Some(SmbVersion::V3),
            uid: None,
            gid: None,
            auto_mount: false,
        }
    }

    #[test]
    fn test_smb_with_credentials() {
        let mp = Path::new("/mnt/remotes/192.168.1.5/movies");
        let command = mount_command(&smb_share(), mp, Some("pw"));
        assert_eq!(
            command.argv(),
            [
                "mount",
                "-t",
                "cifs",
                "//192.168.1.5/movies",
                "/mnt/remotes/192.168.1.5/movies",
                "-o",
                "username=alice,password=pw,vers=3.0",
            ]
        );
    }

    #[test]
    fn test_smb_redaction() {
        let share = RemoteShare {
            domain: Some("WORK".to_string()),
            uid: Some(1000),
            ..smb_share()
        };
        let command = mount_command(&share, Path::new("/mnt/x"), Some("hunter2,x"));
        assert_eq!(
            command.argv()[6],
            "username=alice,password=hunter2,,x,vers=3.0,domain=WORK,uid=1000"
        );
        let shown = command.redacted();
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("password=***"));
        assert!(!format!("{command:?}").contains("hunter2"));
    }

    proptest::proptest! {
        #[test]
        fn test_redacted_never_shows_password(pw in "[A-Za-z0-9,;=@%]{1,32}") {
            let command = mount_command(&smb_share(), Path::new("/mnt/x"), Some(&pw));
            let expected = format!("password={}", pw.replace(',', ",,"));
            proptest::prop_assert!(
                command.argv()[6].contains(&expected),
                "escaped password missing from mount options"
            );
            let leaked = format!("password={pw}");
            proptest::prop_assert!(
                !command.redacted().contains(&leaked),
                "password shown in redacted command"
            );
        }
    }

    #[test]
    fn test_smb_guest() {
        let share = RemoteShare {
            username: None,
            password: None,
            version: Some(SmbVersion::V2),
            gid: Some(100),
            ..smb_share()
        };
        let command = mount_command(&share, Path::new("/mnt/x"), None);
        assert_eq!(command.argv()[6], "guest,vers=2.0,gid=100");

        // A username without a password is still guest access
        let command = mount_command(&smb_share(), Path::new("/mnt/x"), Some(""));
        assert_eq!(command.argv()[6], "guest,vers=3.0");
    }

    #[test]
    fn test_nfs_command() {
        let share = RemoteShare {
            share_type: ShareType::Nfs,
            server: "nas".to_string(),
            share: "/export/media".to_string(),
            username: None,
            password: None,
            version: None,
            uid: Some(1000),
            gid: Some(1000),
            ..smb_share()
        };
        let command = mount_command(&share, Path::new("/mnt/remotes/nas/_export_media"), None);
        assert_eq!(
            command.argv(),
            [
                "mount",
                "-t",
                "nfs",
                "-o",
                "vers=4,rsize=1048576,wsize=1048576,hard,intr,timeo=600,uid=1000,gid=1000",
                "nas:/export/media",
                "/mnt/remotes/nas/_export_media",
            ]
        );
    }

    #[test]
    fn test_cleanup_removes_only_empty_dirs() {
        let base = tempfile::tempdir().unwrap();
        let server_dir = base.path().join("nas");
        let a = server_dir.join("a");
        let b = server_dir.join("b");
        std::fs::create_dir_all(&a).unwrap();
        std::fs::create_dir_all(&b).unwrap();

        let orchestrator = MountOrchestrator::new(
            Arc::new(crate::command::SystemCommandRunner),
            Duration::from_secs(1),
        );
        orchestrator.cleanup(&a);
        assert!(!a.exists());
        assert!(server_dir.exists());

        std::fs::write(b.join("file"), "x").unwrap();
        orchestrator.cleanup(&b);
        assert!(b.exists());

        std::fs::remove_file(b.join("file")).unwrap();
        orchestrator.cleanup(&b);
        assert!(!server_dir.exists());
        assert!(base.path().exists());
    }
}
