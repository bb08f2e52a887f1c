//! `validate` - check a manifest without touching the system
//!
//! Structural problems (duplicates, dangling or self-referential
//! notification edges) surface while lowering; per-type attribute and
//! action problems come from the providers.

use anyhow::Result;

use crate::cli::ValidateArgs;
use crate::manifest::Manifest;
use crate::{paths, provider, ui};

pub fn run(args: ValidateArgs) -> Result<i32> {
    let path = paths::manifest_path(args.manifest)?;
    let manifest = Manifest::load(&path)?;
    let (registry, graph) = manifest.lower()?;

    let providers = provider::builtin_registry();
    let mut problems = 0;

    for decl in registry.iter() {
        match providers.resolve(decl.rtype()) {
            Err(e) => {
                ui::error(&format!("{}: {e}", decl.id()));
                problems += 1;
            }
            Ok(provider) => {
                if let Err(e) = provider.validate(decl, decl.action) {
                    ui::error(&format!("{}: {e:#}", decl.id()));
                    problems += 1;
                }
            }
        }
    }

    // notified actions must make sense for their targets too
    for (source, notification) in graph.iter() {
        let Ok(target) = registry.lookup(&notification.target) else {
            continue; // lowering already rejected dangling edges
        };
        if let Ok(provider) = providers.resolve(target.rtype())
            && let Err(e) = provider.validate(target, notification.action)
        {
            ui::error(&format!(
                "{source} notifies {}: {e:#}",
                notification.target
            ));
            problems += 1;
        }
    }

    println!();
    if problems == 0 {
        ui::success(&format!(
            "{} valid: {} resources, {} notification edges",
            path.display(),
            registry.len(),
            graph.len()
        ));
        Ok(0)
    } else {
        ui::error(&format!("{problems} problem(s) found"));
        Ok(1)
    }
}
