//! Live mount state from the kernel mount table.
//!
//! Status is never persisted: every read asks the kernel. On Linux the table
//! is `/proc/mounts` (`{device} {mountpoint} {fstype} {options} {dump} {pass}`),
//! with whitespace and backslashes in paths written as octal escapes.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use netmount_core::MountStatus;

/// Default location of the kernel mount table.
pub const DEFAULT_MOUNT_TABLE: &str = "/proc/mounts";

/// One entry of the mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemMount {
    /// Device or remote source (`//server/share`, `server:/export`)
    pub source: String,
    /// Mount target
    pub mountpoint: PathBuf,
    /// Filesystem type (`cifs`, `nfs4`, ...)
    pub fstype: String,
}

/// Answers "is this path a mount target right now?".
pub trait MountProber: Send + Sync {
    /// All current mount targets.
    fn mount_targets(&self) -> io::Result<Vec<PathBuf>>;

    /// Read the table once for checking many paths.
    ///
    /// An unreadable table yields an empty snapshot: everything reports
    /// unmounted rather than failing the caller.
    fn snapshot(&self) -> MountSnapshot {
        match self.mount_targets() {
            Ok(targets) => MountSnapshot::from_targets(targets),
            Err(e) => {
                tracing::warn!("Could not read mount table, assuming nothing is mounted: {}", e);
                MountSnapshot::default()
            }
        }
    }

    /// Whether `path` is currently a mount target.
    fn is_mounted(&self, path: &Path) -> bool {
        self.snapshot().contains(path)
    }
}

/// Point-in-time set of mount targets.
#[derive(Debug, Clone, Default)]
pub struct MountSnapshot {
    targets: HashSet<PathBuf>,
}

impl MountSnapshot {
    /// Build from a list of targets.
    pub fn from_targets(targets: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            targets: targets.into_iter().collect(),
        }
    }

    /// Whether `path` is a target. Paths compare component-wise, so a
    /// trailing slash does not matter.
    pub fn contains(&self, path: &Path) -> bool {
        self.targets.contains(path)
    }

    /// Status of `path`.
    pub fn status(&self, path: &Path) -> MountStatus {
        if self.contains(path) {
            MountStatus::Mounted
        } else {
            MountStatus::Unmounted
        }
    }
}

/// Reads a `/proc/mounts`-format file.
#[derive(Debug, Clone)]
pub struct KernelMountTable {
    path: PathBuf,
}

impl KernelMountTable {
    /// Read the table at `path` (normally [`DEFAULT_MOUNT_TABLE`]).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the table file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse every entry.
    pub fn mounts(&self) -> io::Result<Vec<SystemMount>> {
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(parse_mount_table(&contents))
    }
}

impl Default for KernelMountTable {
    fn default() -> Self {
        Self::new(DEFAULT_MOUNT_TABLE)
    }
}

impl MountProber for KernelMountTable {
    fn mount_targets(&self) -> io::Result<Vec<PathBuf>> {
        Ok(self.mounts()?.into_iter().map(|m| m.mountpoint).collect())
    }
}

/// Parse the full contents of a mount table, skipping malformed lines.
pub fn parse_mount_table(contents: &str) -> Vec<SystemMount> {
    contents.lines().filter_map(parse_mount_line).collect()
}

fn parse_mount_line(line: &str) -> Option<SystemMount> {
    let mut fields = line.split_whitespace();
    let source = fields.next()?;
    let mountpoint = fields.next()?;
    let fstype = fields.next()?;

    Some(SystemMount {
        source: unescape_octal(source),
        mountpoint: PathBuf::from(unescape_octal(mountpoint)),
        fstype: fstype.to_string(),
    })
}

/// Decode `\NNN` octal escapes (`\040` space, `\011` tab, `\012` newline,
/// `\134` backslash). Anything else is kept verbatim.
fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\'
            && let Some(digits) = bytes.get(i + 1..i + 4)
            && digits.iter().all(|b| (b'0'..=b'7').contains(b))
            && let Ok(code) = u8::from_str_radix(&String::from_utf8_lossy(digits), 8)
        {
            out.push(code);
            i += 4;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0
//192.168.1.5/movies /mnt/remotes/192.168.1.5/movies cifs rw,relatime,vers=3.0 0 0
nas:/export/media /mnt/remotes/nas/_export_media nfs4 rw,relatime,vers=4.2 0 0
//nas/my\\040share /mnt/remotes/nas/my\\040dir cifs rw 0 0
garbage
";

    #[test]
    fn test_parse_entries() {
        let mounts = parse_mount_table(SAMPLE);
        assert_eq!(mounts.len(), 4);
        assert_eq!(mounts[1].source, "//192.168.1.5/movies");
        assert_eq!(
            mounts[1].mountpoint,
            PathBuf::from("/mnt/remotes/192.168.1.5/movies")
        );
        assert_eq!(mounts[2].fstype, "nfs4");
    }

    #[test]
    fn test_octal_escapes() {
        assert_eq!(unescape_octal(r"/mnt/my\040dir"), "/mnt/my dir");
        assert_eq!(unescape_octal(r"/a\011b\012c\134d"), "/a\tb\nc\\d");
        assert_eq!(unescape_octal(r"/bad\09x"), r"/bad\09x");
        assert_eq!(unescape_octal(r"/tail\04"), r"/tail\04");

        let mounts = parse_mount_table(SAMPLE);
        assert_eq!(mounts[3].mountpoint, PathBuf::from("/mnt/remotes/nas/my dir"));
    }

    #[test]
    fn test_probe_reads_file_each_time() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let table = KernelMountTable::new(file.path());
        let target = Path::new("/mnt/remotes/192.168.1.5/movies");
        assert!(!table.is_mounted(target));

        file.write_all(SAMPLE.as_bytes()).unwrap();
        file.flush().unwrap();
        assert!(table.is_mounted(target));
        assert!(table.is_mounted(Path::new("/mnt/remotes/192.168.1.5/movies/")));
        assert!(!table.is_mounted(Path::new("/mnt/remotes/192.168.1.5")));
    }

    #[test]
    fn test_unreadable_table_reports_unmounted() {
        let table = KernelMountTable::new("/nonexistent/netmount/mounts");
        assert!(table.mount_targets().is_err());
        let snapshot = table.snapshot();
        assert_eq!(snapshot.status(Path::new("/sys")), MountStatus::Unmounted);
    }
}
