//! converge configuration (`config.toml`)
//!
//! ```toml
//! [engine]
//! jobs = 4
//! max_attempts = 3
//! backoff_base_ms = 500
//! backoff_factor = 2.0
//! backoff_max_ms = 30000
//! action_timeout_secs = 300   # 0 disables the timeout
//!
//! [sandbox]
//! state_file = "~/.local/state/converge/sandbox.json"
//! ```

use crate::paths;
use anyhow::{Context, Result, bail};
use reconciler::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub engine: EngineConfig,
    pub sandbox: SandboxConfig,
}

/// Worker pool, retry, and timeout settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub jobs: usize,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_factor: f64,
    pub backoff_max_ms: u64,
    pub action_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            jobs: 4,
            max_attempts: 3,
            backoff_base_ms: 500,
            backoff_factor: 2.0,
            backoff_max_ms: 30_000,
            action_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SandboxConfig {
    /// Store file; `~` and `$VAR` are expanded
    pub state_file: Option<String>,
}

/// Command-line values that take precedence over the file
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineOverrides {
    pub jobs: Option<usize>,
    pub max_attempts: Option<u32>,
    pub action_timeout_secs: Option<u64>,
}

impl Config {
    /// Load from `path`, or from the default location.
    ///
    /// A missing file yields defaults; an explicitly given path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (paths::config_file()?, false),
        };

        if !path.exists() {
            if explicit {
                bail!("Config file not found: {}", path.display());
            }
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate()
    }

    /// Resolve the sandbox store location
    pub fn sandbox_state_file(&self, cli_override: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = cli_override {
            return Ok(path.to_path_buf());
        }
        match &self.sandbox.state_file {
            Some(file) => Ok(paths::expand(file)),
            None => paths::sandbox_state_file(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.jobs == 0 {
            bail!("engine.jobs must be at least 1");
        }
        if self.max_attempts == 0 {
            bail!("engine.max_attempts must be at least 1");
        }
        if self.backoff_factor.is_nan() || self.backoff_factor < 1.0 {
            bail!(
                "engine.backoff_factor must be >= 1.0 (got {})",
                self.backoff_factor
            );
        }
        if self.backoff_base_ms > self.backoff_max_ms {
            bail!(
                "engine.backoff_base_ms ({}) exceeds engine.backoff_max_ms ({})",
                self.backoff_base_ms,
                self.backoff_max_ms
            );
        }
        Ok(())
    }

    /// Apply command-line overrides, re-validating the result
    pub fn with_overrides(&self, overrides: EngineOverrides) -> Result<Self> {
        let merged = Self {
            jobs: overrides.jobs.unwrap_or(self.jobs),
            max_attempts: overrides.max_attempts.unwrap_or(self.max_attempts),
            action_timeout_secs: overrides
                .action_timeout_secs
                .unwrap_or(self.action_timeout_secs),
            ..self.clone()
        };
        merged.validate()?;
        Ok(merged)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            backoff_factor: self.backoff_factor,
            max_delay: Duration::from_millis(self.backoff_max_ms),
        }
    }

    pub fn action_timeout(&self) -> Option<Duration> {
        (self.action_timeout_secs > 0).then(|| Duration::from_secs(self.action_timeout_secs))
    }
}
