//! Shell command runner.
//!
//! Runs commands via `sh -c` (or `cmd /C` on Windows) with an optional working
//! directory and environment, capturing stdout and stderr in full.

use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::ExecError;
use crate::options::RunOptions;
use crate::outcome::TaskOutcome;
use crate::runner::ProcessRunner;

/// Execute commands through the platform shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl ShellRunner {
    const DEFAULT_UNIX_SHELL: &'static str = "sh";

    pub fn new() -> Self {
        Self
    }

    fn build_command(command: &str, options: &RunOptions) -> Command {
        let mut cmd = if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(command);
            cmd
        } else {
            let shell = options.shell.as_deref().unwrap_or(Self::DEFAULT_UNIX_SHELL);
            let mut cmd = Command::new(shell);
            cmd.arg("-c").arg(command);
            cmd
        };

        if let Some(dir) = &options.working_dir {
            cmd.current_dir(dir);
        }
        if options.clear_env {
            cmd.env_clear();
        }
        cmd.envs(&options.env);

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn status_error(status: ExitStatus) -> Option<ExecError> {
        if status.success() {
            return None;
        }
        if let Some(code) = status.code() {
            return Some(ExecError::ExitCode(code));
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Some(ExecError::Signal(signal));
            }
        }
        Some(ExecError::ExitCode(-1))
    }
}

#[async_trait]
impl ProcessRunner for ShellRunner {
    type Options = RunOptions;

    async fn run(&self, command: &str, options: &RunOptions) -> TaskOutcome {
        debug!(
            command = command,
            working_dir = ?options.working_dir,
            "executing shell command"
        );

        let child = match Self::build_command(command, options).spawn() {
            Ok(child) => child,
            Err(e) => return TaskOutcome::failure(ExecError::spawn(&e)),
        };

        let output = match child.wait_with_output().await {
            Ok(output) => output,
            Err(e) => return TaskOutcome::failure(ExecError::Io(e.to_string())),
        };

        let error = Self::status_error(output.status);
        if let Some(err) = &error {
            debug!(command = command, error = %err, "command failed");
        }

        TaskOutcome {
            error,
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}
