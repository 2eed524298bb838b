use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Placeholder substituted with the worker slot index when a task is dispatched.
pub const DEFAULT_WORKER_ID_TOKEN: &str = "#workerId#";

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key).as_deref() {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}

fn default_max_tasks() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub pool: PoolConfig,
    pub runner: RunnerConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `PAREXEC_PROFILE`. When set (e.g. `CI`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("PAREXEC_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            pool: PoolConfig::from_env_profiled(p),
            runner: RunnerConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pool.validate()
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  pool:    max_tasks={}, worker_id_token={}",
            self.pool.max_tasks,
            self.pool.worker_id_token
        );
        tracing::info!(
            "  runner:  working_dir={}, shell={}, clear_env={}",
            self.runner
                .working_dir
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| "(inherit)".to_string()),
            self.runner.shell.as_deref().unwrap_or("(platform default)"),
            self.runner.clear_env
        );
    }

    /// Return a JSON view of the config, e.g. for diagnostics output.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "pool": {
                "max_tasks": self.pool.max_tasks,
                "worker_id_token": self.pool.worker_id_token,
            },
            "runner": {
                "working_dir": self.runner.working_dir,
                "shell": self.runner.shell,
                "clear_env": self.runner.clear_env,
            },
        })
    }
}

// ── Pool ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of worker slots (maximum concurrently running commands).
    pub max_tasks: usize,
    /// Literal substring replaced with the worker slot index.
    pub worker_id_token: String,
}

impl PoolConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            max_tasks: profiled_env_usize(p, "PAREXEC_MAX_TASKS", default_max_tasks()),
            worker_id_token: profiled_env_or(p, "PAREXEC_WORKER_ID_TOKEN", DEFAULT_WORKER_ID_TOKEN),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tasks == 0 {
            return Err(ConfigError::Invalid {
                key: "PAREXEC_MAX_TASKS",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.worker_id_token.is_empty() {
            return Err(ConfigError::Invalid {
                key: "PAREXEC_WORKER_ID_TOKEN",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_tasks: default_max_tasks(),
            worker_id_token: DEFAULT_WORKER_ID_TOKEN.to_string(),
        }
    }
}

// ── Runner ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Working directory for every command (None = inherit from the host).
    pub working_dir: Option<PathBuf>,
    /// Shell program used for `-c` execution on Unix (None = `sh`).
    pub shell: Option<String>,
    /// Start commands with an empty environment.
    pub clear_env: bool,
}

impl RunnerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            working_dir: profiled_env_opt(p, "PAREXEC_WORKING_DIR").map(PathBuf::from),
            shell: profiled_env_opt(p, "PAREXEC_SHELL"),
            clear_env: profiled_env_bool(p, "PAREXEC_CLEAR_ENV", false),
        }
    }
}
