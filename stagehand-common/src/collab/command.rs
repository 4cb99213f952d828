//! External command execution.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Instant;

use tracing::debug;

use crate::errors::{HarnessError, HarnessResult};

/// Longest output tail kept in error messages.
const OUTPUT_TAIL_BYTES: usize = 2048;

/// A command to run, with optional working directory and env overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    /// Return stdout alone instead of stdout+stderr (for parsed output).
    pub stdout_only: bool,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Keep stderr out of the returned output.
    #[must_use]
    pub fn stdout_only(mut self) -> Self {
        self.stdout_only = true;
        self
    }

    /// Program and arguments joined for display.
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Runs external commands and returns their combined output.
pub trait CommandRunner {
    fn run(&self, command: &ShellCommand) -> HarnessResult<String>;
}

/// Runs commands as child processes of this one.
#[derive(Debug, Clone, Default)]
pub struct ProcessCommandRunner {
    /// Environment applied to every command before per-command overrides.
    base_env: BTreeMap<String, String>,
}

impl ProcessCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.base_env.insert(key.into(), value.into());
        self
    }
}

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, command: &ShellCommand) -> HarnessResult<String> {
        let command_line = command.command_line();
        debug!(command = %command_line, dir = ?command.working_dir, "Executing");

        let mut cmd = Command::new(&command.program);
        cmd.args(command.args.iter().map(OsStr::new))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }
        for (k, v) in self.base_env.iter().chain(command.env.iter()) {
            cmd.env(k, v);
        }

        let start = Instant::now();
        let output = cmd.output().map_err(|e| {
            HarnessError::fatal(&command.program, format!("failed to start `{command_line}`: {e}"))
        })?;
        let duration_ms = start.elapsed().as_millis() as u64;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut combined = stdout.clone();
        combined.push_str(&stderr);

        debug!(
            command = %command_line,
            exit_code = output.status.code(),
            duration_ms,
            output_bytes = combined.len(),
            "Command finished"
        );

        if output.status.success() {
            Ok(if command.stdout_only { stdout } else { combined })
        } else {
            Err(HarnessError::fatal(
                &command.program,
                format!(
                    "`{command_line}` exited with {}: {}",
                    output
                        .status
                        .code()
                        .map_or_else(|| "signal".to_string(), |c| c.to_string()),
                    tail(&combined, OUTPUT_TAIL_BYTES)
                ),
            ))
        }
    }
}

/// Last `max` bytes of `s`, cut on a char boundary.
fn tail(s: &str, max: usize) -> &str {
    let s = s.trim_end();
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}
