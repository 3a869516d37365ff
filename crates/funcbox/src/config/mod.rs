use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::runtime::{Interpreter, RuntimeAdapter, RuntimeError, resolve_interpreter};
use crate::types::IsolationPolicy;

mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../funcbox.example.toml");

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "FUNCBOX";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// An explicit interpreter command for one runtime
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InterpreterConfig {
    /// Program followed by its arguments; the runner script is appended
    pub command: Vec<String>,
}

/// Config for funcbox
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory under which workspaces are created (system temp dir if not specified)
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,

    /// Deadline used when a request does not set one
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Upper bound for requested deadlines
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,

    /// Maximum number of concurrent invocations
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Log lines kept per invocation
    #[serde(default = "default_max_log_lines")]
    pub max_log_lines: usize,

    /// Environment policy for handler processes
    #[serde(default)]
    pub isolation: IsolationPolicy,

    /// Interpreter overrides keyed by runtime ID
    #[serde(default)]
    pub interpreters: HashMap<String, InterpreterConfig>,
}

impl Config {
    /// Create a new config with the embedded defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config from built-in values only, without interpreter overrides
    pub fn empty() -> Self {
        Self {
            workspace_root: None,
            default_timeout_ms: default_timeout_ms(),
            max_timeout_ms: default_max_timeout_ms(),
            max_concurrent: default_max_concurrent(),
            max_log_lines: default_max_log_lines(),
            isolation: IsolationPolicy::default(),
            interpreters: HashMap::new(),
        }
    }

    /// Get the directory workspaces are created under
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("funcbox"))
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.max_timeout_ms)
    }

    /// Resolve the deadline for a request: the requested value or the
    /// default, clamped to the maximum
    pub fn effective_timeout(&self, requested: Option<Duration>) -> Duration {
        requested
            .unwrap_or_else(|| self.default_timeout())
            .min(self.max_timeout())
    }

    /// Resolve the interpreter for an adapter, honoring configured overrides
    pub fn interpreter_for(&self, adapter: &dyn RuntimeAdapter) -> Result<Interpreter, RuntimeError> {
        let command = self
            .interpreters
            .get(adapter.runtime().id())
            .map(|entry| entry.command.as_slice());
        resolve_interpreter(adapter, command)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_timeout_ms() -> u64 {
    7_000
}

fn default_max_timeout_ms() -> u64 {
    60_000
}

fn default_max_concurrent() -> usize {
    16
}

fn default_max_log_lines() -> usize {
    1_000
}
