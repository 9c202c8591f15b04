//! Path resolution for converge
//!
//! # Environment Variables
//!
//! - `CONVERGE_CONFIG_DIR` - Override config directory
//! - `CONVERGE_STATE_DIR` - Override state directory (sandbox store)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `CONVERGE_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/converge` (if set)
//! 3. `~/.config/converge`
//!
//! For state_dir():
//! 1. `CONVERGE_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/converge` (if set)
//! 3. `~/.local/state/converge`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "CONVERGE_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "CONVERGE_STATE_DIR";

const APP_DIR: &str = "converge";

/// Where a directory comes from, in priority order
struct DirSources<'a> {
    label: &'a str,
    env_override: Option<String>,
    xdg: Option<String>,
    home: Option<PathBuf>,
    /// Path under the home directory, e.g. `[".config"]`
    home_default: &'a [&'a str],
}

impl DirSources<'_> {
    fn resolve(self) -> Result<PathBuf> {
        if let Some(dir) = self.env_override {
            let path = expand(&dir);
            log::debug!("Using {} dir from env: {}", self.label, path.display());
            return Ok(path);
        }

        if let Some(xdg) = self.xdg.filter(|x| !x.is_empty()) {
            let path = PathBuf::from(xdg).join(APP_DIR);
            log::debug!("Using XDG {} dir: {}", self.label, path.display());
            return Ok(path);
        }

        let home = self.home.context("Could not determine home directory")?;
        let path = self
            .home_default
            .iter()
            .fold(home, |p, part| p.join(part))
            .join(APP_DIR);
        log::debug!("Using default {} dir: {}", self.label, path.display());
        Ok(path)
    }
}

/// Get the converge config directory path
pub fn config_dir() -> Result<PathBuf> {
    DirSources {
        label: "config",
        env_override: std::env::var(ENV_CONFIG_DIR).ok(),
        xdg: std::env::var("XDG_CONFIG_HOME").ok(),
        home: dirs::home_dir(),
        home_default: &[".config"],
    }
    .resolve()
}

/// Get the converge state directory path
pub fn state_dir() -> Result<PathBuf> {
    DirSources {
        label: "state",
        env_override: std::env::var(ENV_STATE_DIR).ok(),
        xdg: std::env::var("XDG_STATE_HOME").ok(),
        home: dirs::home_dir(),
        home_default: &[".local", "state"],
    }
    .resolve()
}

/// Default location of `config.toml`
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Default location of the sandbox provider's store
pub fn sandbox_state_file() -> Result<PathBuf> {
    Ok(state_dir()?.join("sandbox.json"))
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables leave the input unchanged.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

/// Display a path with the home directory shortened to `~`
pub fn display(path: &Path) -> String {
    match dirs::home_dir() {
        Some(home) if path.starts_with(&home) => match path.strip_prefix(&home) {
            Ok(rest) if rest.as_os_str().is_empty() => "~".to_string(),
            Ok(rest) => format!("~/{}", rest.display()),
            Err(_) => path.display().to_string(),
        },
        _ => path.display().to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
