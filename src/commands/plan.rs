//! `plan` - preview what apply would change, without changing anything

use anyhow::Result;
use colored::Colorize;
use convergence::{Disposition, Executor, PlanEntry};

use crate::cli::PlanArgs;
use crate::guard::HostGuards;
use crate::manifest::Manifest;
use crate::{paths, provider, ui};

pub fn run(args: PlanArgs) -> Result<i32> {
    let path = paths::manifest_path(args.manifest)?;
    let manifest = Manifest::load(&path)?;
    let (registry, _graph) = manifest.lower()?;

    let providers = provider::builtin_registry();
    let guards = HostGuards;
    let entries = Executor::new(&providers, &guards).plan(&registry)?;

    ui::header(&format!("Plan: {}", path.display()));
    render(&entries);

    let changes = count_changes(&entries);
    println!();
    if changes == 0 {
        ui::success("Nothing to do; host already matches the manifest");
    } else {
        ui::info(&format!("{changes} resource(s) would change"));
    }
    Ok(0)
}

pub(crate) fn count_changes(entries: &[PlanEntry]) -> usize {
    entries
        .iter()
        .filter(|e| matches!(e.disposition, Disposition::WouldChange { .. }))
        .count()
}

pub(crate) fn render(entries: &[PlanEntry]) {
    for entry in entries {
        let resource = entry.resource.to_string();
        match &entry.disposition {
            Disposition::UpToDate => {
                println!("  {} {}", "○".dimmed(), resource.dimmed());
            }
            Disposition::WouldSkip { reason } => {
                println!("  {} {} ({})", "⊘".yellow(), resource, reason.dimmed());
            }
            Disposition::WouldChange { summary } => match summary {
                Some(summary) => println!(
                    "  {} {} ({}) {}",
                    "+".green(),
                    resource,
                    entry.action,
                    summary.dimmed()
                ),
                None => println!("  {} {} ({})", "+".green(), resource, entry.action),
            },
        }
    }
}
