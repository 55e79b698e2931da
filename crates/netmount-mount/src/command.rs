//! External command execution with a bounded timeout.
//!
//! Every tool netmount drives (`mount`, `umount`, `smbclient`, `showmount`,
//! `ping`) goes through [`CommandRunner`], so tests can substitute
//! [`crate::testing::FakeRunner`] and never touch real mount tools.

use std::io;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;

use thiserror::Error;

/// Default upper bound for any external command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output, lossily decoded
    pub stdout: String,
    /// Standard error, lossily decoded
    pub stderr: String,
    /// Exit code; `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// The most useful diagnostic line: stderr if present, else stdout.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Failures to run a command at all (as opposed to a non-zero exit).
#[derive(Error, Debug)]
pub enum CommandError {
    /// The argv was empty.
    #[error("Refusing to run an empty command line")]
    Empty,

    /// The program could not be started or waited on.
    #[error("Failed to run {program}: {source}")]
    Spawn {
        /// Program name
        program: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The program did not finish in time and was killed.
    #[error("{program} timed out after {timeout:?}")]
    Timeout {
        /// Program name
        program: String,
        /// The timeout that elapsed
        timeout: Duration,
    },
}

/// Runs an external program and captures its output.
pub trait CommandRunner: Send + Sync {
    /// Run `argv[0]` with `argv[1..]`, killing it if it exceeds `timeout`.
    fn run(&self, argv: &[String], timeout: Duration) -> Result<CommandOutput, CommandError>;
}

/// Runs commands on the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, argv: &[String], timeout: Duration) -> Result<CommandOutput, CommandError> {
        let (program, args) = argv.split_first().ok_or(CommandError::Empty)?;

        let child = Command::new(program)
            .args(args)
            // Tool output is parsed, keep it in the C locale
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: program.clone(),
                source,
            })?;

        let child_id = child.id();
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            let result = child.wait_with_output();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(Ok(output)) => Ok(CommandOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code(),
            }),
            Ok(Err(source)) => Err(CommandError::Spawn {
                program: program.clone(),
                source,
            }),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // The waiter thread reaps the killed child and exits
                kill_child(child_id);
                tracing::warn!("{} timed out after {:?}, killed", program, timeout);
                Err(CommandError::Timeout {
                    program: program.clone(),
                    timeout,
                })
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(CommandError::Spawn {
                program: program.clone(),
                source: io::Error::other("wait thread terminated unexpectedly"),
            }),
        }
    }
}

#[cfg(unix)]
fn kill_child(child_id: u32) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(raw_pid) = i32::try_from(child_id) else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(raw_pid), Signal::SIGKILL) {
        tracing::debug!("Failed to kill timed out child {}: {}", child_id, e);
    }
}

#[cfg(not(unix))]
fn kill_child(_child_id: u32) {}

/// Convenience for building argv vectors from string literals.
pub fn argv<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}
