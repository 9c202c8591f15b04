//! `converge apply` / `converge destroy`

use super::{build_plan, load_config, load_manifest, open_sandbox, run_options};
use crate::Context;
use crate::cli::RunArgs;
use crate::config::EngineOverrides;
use crate::paths;
use crate::progress::{Echo, RunProgress};
use crate::sandbox;
use crate::ui;
use anyhow::{Result, bail};
use colored::Colorize;
use dialoguer::Confirm;
use reconciler::{Intent, Preview, ResourceReport, RunReport, SkipReason};
use std::io::IsTerminal;

pub fn apply(ctx: &Context, args: RunArgs) -> Result<()> {
    execute(ctx, args, Intent::Apply)
}

pub fn destroy(ctx: &Context, args: RunArgs) -> Result<()> {
    execute(ctx, args, Intent::Destroy)
}

/// Plan, optionally confirm, then run.
///
/// When a confirmation is needed the preview reads every planned resource
/// once to show the changes, and the run reads each one again before acting.
/// The second read decides what happens, so anything that drifted while the
/// prompt was open is acted on as it is now rather than as previewed.
fn execute(ctx: &Context, args: RunArgs, intent: Intent) -> Result<()> {
    let config = load_config(ctx)?;
    let manifest = load_manifest(&args.manifest)?;
    if manifest.is_empty() && !args.json {
        ui::warn(&format!("{} declares no resources", paths::display(&args.manifest.file)));
        return Ok(());
    }
    let plan = build_plan(&manifest, intent, &args.target)?;

    let store = open_sandbox(ctx, &config)?;
    let adapters = sandbox::registry(&store);
    let options = run_options(
        &config,
        EngineOverrides {
            jobs: args.jobs,
            max_attempts: args.retries,
            action_timeout_secs: args.timeout,
        },
        &args.target,
        args.dry_run,
    )?;

    let interactive = std::io::stdin().is_terminal() && console::user_attended();
    let total = plan.execution.total_resources();

    if !args.json {
        ui::header(&format!("converge {intent}"));
        ui::kv("Manifest", &paths::display(&args.manifest.file));
        ui::kv("State", &paths::display(store.path()));
        ui::kv("Resources", &total.to_string());
        ui::kv("Jobs", &options.jobs.to_string());
    }

    if needs_confirmation(&args, interactive) {
        let preview = reconciler::preview(&plan, &adapters, &options)?;
        print_preview(&preview);

        if !preview.summary.has_changes() && preview.unreadable.is_empty() {
            println!();
            ui::success("Nothing to change");
            return Ok(());
        }
        if !confirm(intent)? {
            println!();
            println!("  {} Aborted", "✗".red());
            return Ok(());
        }
    }

    let progress = RunProgress::new(total, interactive, echo_for(ctx, &args));
    let report = reconciler::run_plan(plan, &adapters, &options, &progress)?;
    progress.finish();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(ctx, &report);
    }

    if !report.overall_success {
        bail!("{} failed for {}", intent, ui::resources(report.summary.failed));
    }
    Ok(())
}

/// Stdout carries the JSON report under `--json`, so nothing else may echo
fn echo_for(ctx: &Context, args: &RunArgs) -> Echo {
    if args.json || ctx.quiet {
        Echo::Silent
    } else if ctx.verbose > 0 {
        Echo::All
    } else {
        Echo::Problems
    }
}

fn needs_confirmation(args: &RunArgs, interactive: bool) -> bool {
    interactive && !args.yes && !args.dry_run && !args.json
}

fn confirm(intent: Intent) -> Result<bool> {
    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(intent == Intent::Apply)
        .interact()?;
    Ok(confirmed)
}

fn print_preview(preview: &Preview) {
    if preview.diffs.is_empty() && preview.unreadable.is_empty() {
        return;
    }
    ui::section("Changes");
    for diff in &preview.diffs {
        println!("  {} {}", ui::verb_label(diff.verb), diff.id);
    }
    for (id, err) in &preview.unreadable {
        println!("  {} {} {}", "?".yellow(), id, err.to_string().dimmed());
    }
}

fn print_report(ctx: &Context, report: &RunReport) {
    let shown: Vec<&ResourceReport> = report
        .entries
        .iter()
        .filter(|e| ctx.verbose > 0 || !e.is_unchanged())
        .collect();

    if !shown.is_empty() {
        ui::section("Resources");
        for entry in shown {
            print_entry(ctx, entry);
        }
    }

    print_summary(report);
}

fn print_entry(ctx: &Context, entry: &ResourceReport) {
    let verb = entry
        .verb
        .map(|v| ui::verb_label(v).to_string())
        .unwrap_or_default();
    println!(
        "  {} {} {} {}",
        ui::status_icon(entry.status, entry.verb),
        entry.id,
        verb,
        ui::format_duration_ms(entry.elapsed_ms).dimmed()
    );

    if let Some(err) = &entry.error {
        let attempts = if entry.attempts > 1 {
            format!(" after {} attempts", entry.attempts)
        } else {
            String::new()
        };
        println!("      {} {}{}", err.category.description().red(), err, attempts);
        if !ctx.quiet {
            ui::dim(&format!("    {}", err.category.advice()));
        }
    }

    match &entry.skip_reason {
        Some(SkipReason::DryRun) | None => {}
        Some(reason) => ui::dim(&format!("    skipped: {reason}")),
    }
}

fn print_summary(report: &RunReport) {
    let summary = &report.summary;
    let action = match report.intent {
        Intent::Apply => "Apply",
        Intent::Destroy => "Destroy",
    };

    println!();
    if report.dry_run {
        println!("  {} Dry run - no changes made", "ℹ".blue());
    } else if report.overall_success {
        println!("  {} {} finished successfully!", "✓".green().bold(), action);
    } else {
        println!("  {} {} finished with errors", "⚠".yellow().bold(), action);
    }

    if summary.created > 0 {
        println!("    • {} created", ui::resources(summary.created));
    }
    if summary.updated > 0 {
        println!("    • {} updated", ui::resources(summary.updated));
    }
    if summary.deleted > 0 {
        println!("    • {} deleted", ui::resources(summary.deleted));
    }
    if summary.unchanged > 0 {
        println!("    • {} unchanged", ui::resources(summary.unchanged));
    }
    if summary.skipped > 0 {
        println!("    • {} skipped", ui::resources(summary.skipped));
    }
    if summary.failed > 0 {
        println!("    • {} {}", ui::resources(summary.failed), "failed".red());
    }

    let elapsed = report.duration().num_milliseconds().max(0) as u64;
    ui::dim(&format!("  took {}", ui::format_duration_ms(elapsed)));
}
