//! External Command Execution
//!
//! Every external helper (`java`, `keytool`, `kubectl`, `which`) is launched through the
//! [`CommandRunner`] trait so validators can be exercised against a scripted runner in tests.
//!
//! # Argument Vectors
//! Commands are always executed from an argument vector, never through a shell. Credentials reach
//! the helper byte-for-byte regardless of quotes or spaces they contain.
//!
//! The POSIX shell rendering ([`Invocation::to_shell_line`]) exists only so operators can copy a
//! failing command from the log file and rerun it by hand. The [`Display`](std::fmt::Display)
//! rendering masks secret arguments and is what gets logged.

use std::ffi::OsString;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::error::{PrereqError, Result};

/// A program plus its argument vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name or path
    pub program: String,

    /// Arguments in order
    pub args: Vec<String>,

    /// Indices into `args` that must not appear in logs
    secret_args: Vec<usize>,
}

impl Invocation {
    /// Start an invocation of `program` with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new(), secret_args: Vec::new() }
    }

    /// Append a plain argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several plain arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append a filesystem path argument
    #[must_use]
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.display().to_string())
    }

    /// Append an argument that is masked in log output
    #[must_use]
    pub fn secret(mut self, value: impl Into<String>) -> Self {
        self.secret_args.push(self.args.len());
        self.args.push(value.into());
        self
    }

    /// Whether the argument at `index` was added with [`Invocation::secret`]
    #[must_use]
    pub fn is_secret(&self, index: usize) -> bool {
        self.secret_args.contains(&index)
    }

    /// Render as a single POSIX shell command line, secrets included
    #[must_use]
    pub fn to_shell_line(&self) -> String {
        std::iter::once(shell_quote(&self.program))
            .chain(self.args.iter().map(|a| shell_quote(a)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", shell_quote(&self.program))?;
        for (index, arg) in self.args.iter().enumerate() {
            if self.is_secret(index) {
                write!(f, " '********'")?;
            } else {
                write!(f, " {}", shell_quote(arg))?;
            }
        }
        Ok(())
    }
}

/// Escape embedded single quotes for use inside a single-quoted POSIX shell word
///
/// `a'b` becomes `a'\''b`: close the quote, emit an escaped quote, reopen.
#[must_use]
pub fn escape_single_quotes(value: &str) -> String {
    value.replace('\'', r"'\''")
}

/// Quote a single word for a POSIX shell
///
/// Words made only of characters the shell never interprets are left bare.
#[must_use]
pub fn shell_quote(value: &str) -> String {
    let bare = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '=' | ',' | '@' | '+' | '%'));
    if bare {
        value.to_string()
    } else {
        format!("'{}'", escape_single_quotes(value))
    }
}

/// Join classpath entries with the platform separator (`:` or `;`)
pub fn join_classpath(entries: &[PathBuf]) -> Result<String> {
    let joined = std::env::join_paths(entries).map_err(|e| {
        PrereqError::invalid_input(format!("Classpath entry contains a separator: {e}"))
    })?;
    os_to_string(joined)
}

fn os_to_string(value: OsString) -> Result<String> {
    value
        .into_string()
        .map_err(|v| PrereqError::invalid_input(format!("Path is not valid UTF-8: {v:?}")))
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal
    pub status: Option<i32>,

    /// Captured standard output
    pub stdout: String,

    /// Captured standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self { status: Some(0), stdout: stdout.into(), stderr: String::new() }
    }

    /// Failed output with the given exit code and stderr
    #[must_use]
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self { status: Some(code), stdout: String::new(), stderr: stderr.into() }
    }

    /// Whether the process exited with status 0
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.status, Some(0))
    }

    /// Turn a non-zero exit into [`PrereqError::CommandFailed`]
    pub fn into_result(self, program: &str) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            let detail = match self.stderr.trim() {
                "" => format!("exit status {:?}", self.status),
                stderr => stderr.to_string(),
            };
            Err(PrereqError::command_failed(program, detail))
        }
    }
}

/// Executes external commands
///
/// `Err` is reserved for failures to run the program at all (not installed, timed out).
/// A program that runs and exits non-zero is reported through [`CommandOutput::status`].
pub trait CommandRunner: Send + Sync {
    /// Run the invocation to completion, capturing stdout and stderr
    fn run(&self, invocation: &Invocation) -> impl Future<Output = Result<CommandOutput>> + Send;
}

/// Runs commands on the local machine with `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    timeout: Option<Duration>,
    current_dir: Option<PathBuf>,
}

impl SystemRunner {
    /// Create a runner with no timeout in the current directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill commands that run longer than `timeout`
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run commands from `dir`
    #[must_use]
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        debug!(command = %invocation, "running external command");

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let child = command.output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child).await.map_err(|_| {
                PrereqError::command_failed(
                    &invocation.program,
                    format!("timed out after {}s", limit.as_secs()),
                )
            })?,
            None => child.await,
        };

        let output = output.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PrereqError::missing_tool(&invocation.program),
            _ => PrereqError::command_failed(&invocation.program, e.to_string()),
        })?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
