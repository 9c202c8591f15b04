//! `converge state` - list what the sandbox provider holds

use super::{load_config, open_sandbox};
use crate::Context;
use crate::paths;
use crate::sandbox::StoredObject;
use crate::ui;
use anyhow::Result;
use colored::Colorize;
use reconciler::ResourceKind;
use std::collections::BTreeMap;

pub fn run(ctx: &Context) -> Result<()> {
    let config = load_config(ctx)?;
    let store = open_sandbox(ctx, &config)?;
    let objects = store.list();

    ui::header("Sandbox state");
    ui::kv("File", &paths::display(store.path()));

    if objects.is_empty() {
        println!();
        ui::info("No objects");
        return Ok(());
    }

    for (kind, objects) in by_kind(&objects) {
        ui::section(kind.as_str());
        for object in objects {
            println!(
                "  {} {} {}",
                "•".cyan(),
                object.id.name.bold(),
                object.provider_id.dimmed()
            );
            if !ctx.quiet {
                ui::dim(&format!(
                    "  updated {}",
                    object.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
                ));
            }
            if ctx.verbose > 0 {
                let spec = serde_json::to_string(&object.spec)?;
                ui::dim(&format!("  {spec}"));
            }
        }
    }

    println!();
    ui::success(&format!("{} object(s)", objects.len()));
    Ok(())
}

fn by_kind(objects: &[StoredObject]) -> BTreeMap<ResourceKind, Vec<&StoredObject>> {
    let mut grouped: BTreeMap<ResourceKind, Vec<&StoredObject>> = BTreeMap::new();
    for object in objects {
        grouped.entry(object.id.kind).or_default().push(object);
    }
    grouped
}
