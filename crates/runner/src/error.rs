//! Task execution error types.

use std::io;

use thiserror::Error;

/// Why a command did not complete successfully.
///
/// These are never scheduler errors: they are handed verbatim to whoever
/// observes task completion.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecError {
    #[error("failed to spawn command: {message}")]
    Spawn { kind: io::ErrorKind, message: String },

    #[error("command exited with status {0}")]
    ExitCode(i32),

    #[error("command terminated by signal {0}")]
    Signal(i32),

    #[error("failed to collect command output: {0}")]
    Io(String),

    #[error("process runner panicked: {0}")]
    RunnerPanicked(String),
}

impl ExecError {
    pub fn spawn(err: &io::Error) -> Self {
        Self::Spawn {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Exit code, if the command ran and exited non-zero.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::ExitCode(code) => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_error_keeps_kind() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "no such file");
        let err = ExecError::spawn(&io_err);
        assert!(matches!(err, ExecError::Spawn { kind: io::ErrorKind::NotFound, .. }));
        assert!(err.to_string().contains("no such file"));
    }

    #[test]
    fn exit_code_accessor() {
        assert_eq!(ExecError::ExitCode(3).exit_code(), Some(3));
        assert_eq!(ExecError::Signal(9).exit_code(), None);
        assert_eq!(ExecError::ExitCode(3).to_string(), "command exited with status 3");
    }
}
