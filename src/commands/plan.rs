//! `converge plan` - structural validation, no provider calls

use super::{build_plan, load_manifest};
use crate::Context;
use crate::cli::PlanArgs;
use crate::paths;
use crate::ui;
use anyhow::Result;
use colored::Colorize;
use reconciler::{Intent, Plan};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct PlanOutput {
    intent: Intent,
    resources: usize,
    levels: Vec<Vec<String>>,
}

impl PlanOutput {
    fn from_plan(plan: &Plan) -> Self {
        let levels: Vec<Vec<String>> = plan
            .levels()
            .into_iter()
            .map(|ids| ids.iter().map(ToString::to_string).collect())
            .collect();
        Self {
            intent: plan.intent(),
            resources: levels.iter().map(Vec::len).sum(),
            levels,
        }
    }
}

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let manifest = load_manifest(&args.manifest)?;
    let plan = build_plan(&manifest, args.intent.into(), &args.target)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&PlanOutput::from_plan(&plan))?);
        return Ok(());
    }

    ui::header(&format!("Plan: {}", plan.intent()));
    ui::kv("Manifest", &paths::display(&args.manifest.file));
    ui::kv("Files", &manifest.sources.len().to_string());
    ui::kv("Groups", &manifest.groups.len().to_string());

    let mut current = None;
    for (level, resource) in plan.ordered() {
        if current != Some(level) {
            ui::section(&format!("Level {level}"));
            current = Some(level);
        }

        let group = resource
            .group
            .as_deref()
            .map(|g| format!("[{g}]"))
            .unwrap_or_default();
        println!("  {} {} {}", "•".cyan(), resource.id(), group.dimmed());

        if !ctx.quiet && !resource.decl.depends_on.is_empty() {
            let deps: Vec<String> = resource.decl.depends_on.iter().map(ToString::to_string).collect();
            ui::dim(&format!("  depends on {}", deps.join(", ")));
        }
    }

    println!();
    let total = plan.execution.total_resources();
    if total == 0 {
        ui::info("Nothing to plan");
    } else {
        ui::success(&format!(
            "{} in {} level(s)",
            ui::resources(total),
            plan.execution.levels().len()
        ));
    }
    Ok(())
}
