use std::borrow::Cow;

use crate::error::ExecError;

/// Completion report for one command: error-or-none plus captured output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOutcome {
    pub error: Option<ExecError>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl TaskOutcome {
    pub fn success(stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            error: None,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn failure(error: ExecError) -> Self {
        Self {
            error: Some(error),
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}
