//! `converge diff` - read observed state and show what would change

use super::{build_plan, load_config, load_manifest, open_sandbox, run_options};
use crate::Context;
use crate::cli::DiffArgs;
use crate::config::EngineOverrides;
use crate::sandbox;
use crate::ui;
use anyhow::Result;
use colored::Colorize;
use reconciler::normalize::normalize;
use reconciler::{ResourceDiff, Verb, group_by_kind};
use similar::{ChangeTag, TextDiff};

pub fn run(ctx: &Context, args: DiffArgs) -> Result<()> {
    let config = load_config(ctx)?;
    let manifest = load_manifest(&args.manifest)?;
    let plan = build_plan(&manifest, args.intent.into(), &args.target)?;

    let store = open_sandbox(ctx, &config)?;
    let adapters = sandbox::registry(&store);
    let options = run_options(
        &config,
        EngineOverrides {
            jobs: args.jobs,
            ..Default::default()
        },
        &args.target,
        true,
    )?;

    let preview = reconciler::preview(&plan, &adapters, &options)?;

    ui::header(&format!("Diff: {}", plan.intent()));

    for (kind, diffs) in group_by_kind(&preview.diffs) {
        ui::section(kind.as_str());
        for diff in diffs {
            println!("  {} {}", ui::verb_label(diff.verb), diff.id);
            if !ctx.quiet {
                print_spec_diff(diff);
            }
        }
    }

    if !preview.unreadable.is_empty() {
        ui::section("Unreadable");
        for (id, err) in &preview.unreadable {
            ui::error(&format!("{id}: {err}"));
            ui::dim(&format!("  {}", err.category.advice()));
        }
    }

    println!();
    let summary = preview.summary;
    if summary.has_changes() {
        ui::info(&format!(
            "{} to create, {} to update, {} to delete",
            summary.creates, summary.updates, summary.deletes
        ));
    } else {
        ui::success("No changes. Resources match the manifest.");
    }
    Ok(())
}

fn print_spec_diff(diff: &ResourceDiff) {
    for (tag, line) in spec_diff_lines(diff) {
        match tag {
            ChangeTag::Delete => print!("      {}", format!("- {line}").red()),
            ChangeTag::Insert => print!("      {}", format!("+ {line}").green()),
            ChangeTag::Equal => print!("      {}", format!("  {line}").dimmed()),
        }
    }
}

/// Line diff of normalized observed vs desired JSON
fn spec_diff_lines(diff: &ResourceDiff) -> Vec<(ChangeTag, String)> {
    let kind = diff.kind();
    let old = diff
        .observed
        .as_ref()
        .map(|spec| pretty(&normalize(kind, spec)))
        .unwrap_or_default();
    let new = if diff.verb == Verb::Delete {
        String::new()
    } else {
        pretty(&normalize(kind, &diff.desired))
    };

    TextDiff::from_lines(&old, &new)
        .iter_all_changes()
        .map(|change| {
            let mut line = change.value().to_string();
            if !line.ends_with('\n') {
                line.push('\n');
            }
            (change.tag(), line)
        })
        .collect()
}

fn pretty(value: &serde_json::Value) -> String {
    let mut text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    text.push('\n');
    text
}
