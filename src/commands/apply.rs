//! `apply` - converge the host to match the manifest

use anyhow::{Context as AnyhowContext, Result};
use chrono::Local;
use colored::Colorize;
use convergence::{
    Action, Executor, NoProgress, Outcome, ResourceId, RunOptions, RunProgress, RunReport,
};
use std::time::Instant;

use crate::cli::{ApplyArgs, ReportFormat};
use crate::guard::HostGuards;
use crate::manifest::Manifest;
use crate::{paths, provider, ui};

use super::plan;

/// Prints one status line per resource as the run progresses
struct ConsoleProgress;

impl RunProgress for ConsoleProgress {
    fn on_resource_start(&mut self, id: &ResourceId, action: Action) {
        log::debug!("starting {id} ({action})");
    }

    fn on_resource_complete(&mut self, id: &ResourceId, outcome: &Outcome) {
        match outcome {
            Outcome::Updated => println!("  {} {}", "✓".green(), id),
            Outcome::Unchanged => println!("  {} {}", "○".dimmed(), id.to_string().dimmed()),
            Outcome::Skipped { reason } => {
                println!("  {} {} ({})", "⊘".yellow(), id, reason.dimmed());
            }
            Outcome::Failed { error } => println!("  {} {}: {}", "✗".red(), id, error),
            Outcome::NotRun => {}
        }
    }
}

pub fn run(args: ApplyArgs) -> Result<i32> {
    let path = paths::manifest_path(args.manifest)?;
    let manifest = Manifest::load(&path)?;
    let (registry, graph) = manifest.lower()?;

    let providers = provider::builtin_registry();
    let guards = HostGuards;
    let executor = Executor::new(&providers, &guards);

    // Preview first; notifications only fire off actual changes, so an
    // all-clean plan means an all-clean run.
    let entries = executor.plan(&registry)?;
    let text = args.format == ReportFormat::Text;
    if text {
        ui::header(&format!("Apply: {}", path.display()));
        plan::render(&entries);
        println!();
    }

    if plan::count_changes(&entries) == 0 {
        if text {
            ui::success("Host already matches the manifest");
        }
        return Ok(0);
    }

    if !args.yes && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(0);
    }

    log::info!(
        "run started at {} against {}",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        path.display()
    );
    let opts = RunOptions {
        best_effort: args.best_effort,
    };
    let started = Instant::now();
    let report = if text {
        executor.run(&registry, &graph, &opts, &mut ConsoleProgress)?
    } else {
        executor.run(&registry, &graph, &opts, &mut NoProgress)?
    };

    match args.format {
        ReportFormat::Text => print_summary(&report, started.elapsed().as_secs_f32()),
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(report.exit_code())
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()
        .context("Failed to read confirmation")?;

    Ok(confirmed)
}

/// Print final summary
fn print_summary(report: &RunReport, elapsed_secs: f32) {
    println!();
    if report.is_success() {
        println!(
            "  {} Host converged in {elapsed_secs:.1}s",
            "✓".green().bold()
        );
    } else {
        println!("  {} Run failed", "✗".red().bold());
    }

    if report.updated() > 0 {
        println!("    • {} resources updated", report.updated());
    }
    if report.unchanged() > 0 {
        println!("    • {} resources already converged", report.unchanged());
    }
    if report.skipped() > 0 {
        println!("    • {} resources skipped by guards", report.skipped());
    }
    if report.failed() > 0 {
        println!("    • {} {} failed", report.failed(), "resources".red());
    }
    if report.not_run() > 0 {
        println!("    • {} resources not run", report.not_run());
    }
}
