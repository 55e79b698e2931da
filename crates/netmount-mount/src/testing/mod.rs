//! Test doubles for the host-facing seams.
//!
//! [`FakeRunner`] stands in for the mount and discovery tools: it records
//! every argv, answers with scripted output, and (when linked to a
//! [`FakeMountTable`]) updates the fake table the way real `mount`/`umount`
//! would update `/proc/mounts`.
//!
//! ```
//! use std::path::Path;
//! use std::sync::Arc;
//! use netmount_mount::mount_table::MountProber;
//! use netmount_mount::testing::{FakeMountTable, FakeRunner};
//!
//! let table = FakeMountTable::new();
//! let runner = Arc::new(FakeRunner::new().with_mount_table(table.clone()));
//! runner.respond("ping", FakeRunner::failed(1, "unreachable"));
//! # let _ = runner;
//! assert!(!table.is_mounted(Path::new("/mnt/remotes/nas/media")));
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::command::{CommandError, CommandOutput, CommandRunner};
use crate::mount_table::MountProber;

/// Scripted reaction to a command.
#[derive(Debug, Clone)]
pub enum FakeResponse {
    /// Finish with this output
    Output(CommandOutput),
    /// Behave as if the command hung past its timeout
    Timeout,
}

impl From<CommandOutput> for FakeResponse {
    fn from(output: CommandOutput) -> Self {
        FakeResponse::Output(output)
    }
}

/// Mount table held in memory.
#[derive(Debug, Clone, Default)]
pub struct FakeMountTable {
    targets: Arc<Mutex<HashSet<PathBuf>>>,
    unreadable: Arc<Mutex<bool>>,
}

impl FakeMountTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `path` as mounted.
    pub fn insert(&self, path: impl Into<PathBuf>) {
        self.targets.lock().insert(path.into());
    }

    /// Mark `path` as unmounted.
    pub fn remove(&self, path: &Path) {
        self.targets.lock().remove(path);
    }

    /// Current targets, sorted.
    pub fn targets(&self) -> Vec<PathBuf> {
        let mut targets: Vec<_> = self.targets.lock().iter().cloned().collect();
        targets.sort();
        targets
    }

    /// Make reads fail, as an unreadable `/proc/mounts` would.
    pub fn set_unreadable(&self, unreadable: bool) {
        *self.unreadable.lock() = unreadable;
    }
}

impl MountProber for FakeMountTable {
    fn mount_targets(&self) -> io::Result<Vec<PathBuf>> {
        if *self.unreadable.lock() {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "fake table unreadable"));
        }
        Ok(self.targets.lock().iter().cloned().collect())
    }
}

/// Scriptable [`CommandRunner`].
///
/// Unscripted programs succeed with empty output.
#[derive(Debug, Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<Vec<String>>>,
    queued: Mutex<HashMap<String, VecDeque<FakeResponse>>>,
    standing: Mutex<HashMap<String, FakeResponse>>,
    table: Option<FakeMountTable>,
}

impl FakeRunner {
    /// Runner where everything succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply successful `mount`/`umount` invocations to `table`.
    #[must_use]
    pub fn with_mount_table(mut self, table: FakeMountTable) -> Self {
        self.table = Some(table);
        self
    }

    /// Successful output with `stdout`.
    pub fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    /// Failed output with `stderr`.
    pub fn failed(exit_code: i32, stderr: &str) -> CommandOutput {
        CommandOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code: Some(exit_code),
        }
    }

    /// Answer every future call to `program` with `response`.
    pub fn respond(&self, program: &str, response: impl Into<FakeResponse>) {
        self.standing
            .lock()
            .insert(program.to_string(), response.into());
    }

    /// Answer the next call to `program` with `response`, ahead of any
    /// standing response.
    pub fn respond_once(&self, program: &str, response: impl Into<FakeResponse>) {
        self.queued
            .lock()
            .entry(program.to_string())
            .or_default()
            .push_back(response.into());
    }

    /// Every argv seen so far, in order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }

    /// Calls whose program is `program`.
    pub fn calls_to(&self, program: &str) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .iter()
            .filter(|argv| argv.first().is_some_and(|p| p == program))
            .cloned()
            .collect()
    }

    fn response_for(&self, program: &str) -> FakeResponse {
        if let Some(response) = self
            .queued
            .lock()
            .get_mut(program)
            .and_then(VecDeque::pop_front)
        {
            return response;
        }
        self.standing
            .lock()
            .get(program)
            .cloned()
            .unwrap_or_else(|| FakeResponse::Output(Self::ok("")))
    }

    fn apply_to_table(&self, argv: &[String]) {
        let Some(table) = &self.table else {
            return;
        };
        match argv.first().map(String::as_str) {
            Some("mount") => {
                if let Some(target) = mount_target(argv) {
                    table.insert(target);
                }
            }
            Some("umount") => {
                if let Some(target) = argv.last() {
                    table.remove(Path::new(target));
                }
            }
            _ => {}
        }
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, argv: &[String], timeout: Duration) -> Result<CommandOutput, CommandError> {
        let program = argv.first().ok_or(CommandError::Empty)?.clone();
        self.calls.lock().push(argv.to_vec());

        match self.response_for(&program) {
            FakeResponse::Output(output) => {
                if output.success() {
                    self.apply_to_table(argv);
                }
                Ok(output)
            }
            FakeResponse::Timeout => Err(CommandError::Timeout { program, timeout }),
        }
    }
}

/// Second positional argument of a `mount` argv, skipping `-t`/`-o` values.
fn mount_target(argv: &[String]) -> Option<&str> {
    let mut positionals = Vec::new();
    let mut args = argv.iter().skip(1);
    while let Some(arg) = args.next() {
        if arg == "-t" || arg == "-o" {
            args.next();
        } else if !arg.starts_with('-') {
            positionals.push(arg.as_str());
        }
    }
    positionals.get(1).copied()
}
