//! Subcommand implementations
//!
//! Every command that touches resources follows the same path: load config,
//! load the manifest, build a [`Plan`], wire the sandbox adapters.

pub mod apply;
pub mod diff;
pub mod plan;
pub mod state;

use crate::Context;
use crate::cli::ManifestArgs;
use crate::config::{Config, EngineOverrides};
use crate::manifest::Manifest;
use crate::paths;
use crate::sandbox::SandboxStore;
use anyhow::{Context as AnyhowContext, Result};
use reconciler::{Intent, Plan, RunOptions};
use std::sync::Arc;

pub(crate) fn load_config(ctx: &Context) -> Result<Config> {
    Config::load(ctx.config_path.as_deref())
}

pub(crate) fn load_manifest(args: &ManifestArgs) -> Result<Manifest> {
    let manifest = Manifest::load(&args.file)?;
    log::info!(
        "Loaded {} resource(s) in {} group(s) from {}",
        manifest.len(),
        manifest.groups.len(),
        paths::display(&args.file)
    );
    for decl in manifest.decls() {
        log::trace!("declared {} ({} dependencies)", decl.id, decl.depends_on.len());
    }
    Ok(manifest)
}

pub(crate) fn build_plan(manifest: &Manifest, intent: Intent, targets: &[String]) -> Result<Plan> {
    Plan::new(manifest.builder(), intent, targets).context("Invalid resource graph")
}

pub(crate) fn open_sandbox(ctx: &Context, config: &Config) -> Result<Arc<SandboxStore>> {
    let path = config.sandbox_state_file(ctx.state_path.as_deref())?;
    Ok(Arc::new(SandboxStore::open(&path)?))
}

/// Engine options from config, with command-line overrides applied
pub(crate) fn run_options(
    config: &Config,
    overrides: EngineOverrides,
    targets: &[String],
    dry_run: bool,
) -> Result<RunOptions> {
    let engine = config.engine.with_overrides(overrides)?;
    Ok(RunOptions {
        jobs: engine.jobs,
        retry: engine.retry_policy(),
        action_timeout: engine.action_timeout(),
        dry_run,
        targets: targets.to_vec(),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_run_options_from_config() {
        let options = run_options(
            &Config::default(),
            EngineOverrides {
                jobs: Some(2),
                action_timeout_secs: Some(0),
                ..Default::default()
            },
            &["image".to_string()],
            true,
        )
        .unwrap();
        assert_eq!(options.jobs, 2);
        assert_eq!(options.retry.max_attempts, 3);
        assert_eq!(options.retry.base_delay, Duration::from_millis(500));
        assert_eq!(options.action_timeout, None);
        assert!(options.dry_run);
        assert_eq!(options.targets, ["image"]);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let result = run_options(
            &Config::default(),
            EngineOverrides {
                max_attempts: Some(0),
                ..Default::default()
            },
            &[],
            false,
        );
        assert!(result.is_err());
    }
}
