//! Options applied to every command a runner executes.

use std::collections::BTreeMap;
use std::path::PathBuf;

use parexec_core::RunnerConfig;
use serde::{Deserialize, Serialize};

/// Execution settings for [`ShellRunner`](crate::ShellRunner).
///
/// The scheduler never looks inside these; it hands the same value to the
/// runner on every dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Working directory (None = inherit from the host process).
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables, applied after `clear_env`.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Start from an empty environment instead of inheriting the host's.
    #[serde(default)]
    pub clear_env: bool,
    /// Shell program for `-c` execution on Unix (None = `sh`).
    #[serde(default)]
    pub shell: Option<String>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self {
            working_dir: config.working_dir.clone(),
            env: BTreeMap::new(),
            clear_env: config.clear_env,
            shell: config.shell.clone(),
        }
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn clear_env(mut self, clear: bool) -> Self {
        self.clear_env = clear;
        self
    }

    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = Some(shell.into());
        self
    }
}
