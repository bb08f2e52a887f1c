//! Concrete providers backing each resource type
//!
//! One module per type. Every provider implements the engine's
//! check/apply capability by probing and mutating the live host through
//! external tools; none of them keeps state between calls, so re-running
//! a converged resource is always a no-op.

use anyhow::{Context, Result, bail};
use convergence::{ProviderRegistry, ResourceType};
use std::path::Path;
use std::process::Command;

pub mod directory;
pub mod execute;
pub mod file;
pub mod git;
pub mod group;
pub mod link;
pub mod package;
pub mod service;
pub mod user;

/// Provider registry with every built-in provider registered
pub fn builtin_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(
        ResourceType::Package,
        Box::new(package::PackageProvider::detect()),
    );
    registry.register(ResourceType::User, Box::new(user::UserProvider));
    registry.register(ResourceType::Group, Box::new(group::GroupProvider));
    registry.register(
        ResourceType::Directory,
        Box::new(directory::DirectoryProvider),
    );
    registry.register(ResourceType::File, Box::new(file::FileProvider));
    registry.register(ResourceType::Link, Box::new(link::LinkProvider));
    registry.register(ResourceType::Git, Box::new(git::GitProvider));
    registry.register(ResourceType::Service, Box::new(service::ServiceProvider));
    registry.register(ResourceType::Execute, Box::new(execute::ExecuteProvider));
    registry
}

/// Validate an octal mode string like "0755"
pub(crate) fn validate_mode(mode: &str) -> Result<()> {
    let pattern = regex::Regex::new(r"^[0-7]{3,4}$").context("mode pattern")?;
    if !pattern.is_match(mode) {
        bail!("invalid mode `{mode}`; expected an octal string like 0755");
    }
    Ok(())
}

/// Parse an octal mode string into permission bits
pub(crate) fn parse_mode(mode: &str) -> Result<u32> {
    validate_mode(mode)?;
    u32::from_str_radix(mode, 8).with_context(|| format!("invalid mode `{mode}`"))
}

/// Owner and group names of a path
pub(crate) fn path_owner(path: &Path) -> Result<(String, String)> {
    let output = Command::new("stat")
        .args(["-c", "%U:%G"])
        .arg(path)
        .output()
        .context("Failed to run stat")?;
    if !output.status.success() {
        bail!(
            "stat failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let Some((user, group)) = text.trim().split_once(':') else {
        bail!("unexpected stat output for {}: {}", path.display(), text.trim());
    };
    Ok((user.to_string(), group.to_string()))
}

/// Change ownership of a path, skipping silently when nothing is requested
pub(crate) fn chown(
    path: &Path,
    owner: Option<&str>,
    group: Option<&str>,
    recursive: bool,
) -> Result<()> {
    let spec = match (owner, group) {
        (None, None) => return Ok(()),
        (Some(owner), None) => owner.to_string(),
        (None, Some(group)) => format!(":{group}"),
        (Some(owner), Some(group)) => format!("{owner}:{group}"),
    };

    let mut cmd = Command::new("chown");
    if recursive {
        cmd.arg("-R");
    }
    let output = cmd
        .arg(&spec)
        .arg(path)
        .output()
        .context("Failed to run chown")?;
    if !output.status.success() {
        bail!(
            "chown {spec} {} failed: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

/// Drift between requested and actual ownership, if any
pub(crate) fn owner_drift(
    path: &Path,
    owner: Option<&str>,
    group: Option<&str>,
) -> Result<Option<String>> {
    if owner.is_none() && group.is_none() {
        return Ok(None);
    }
    let (current_owner, current_group) = path_owner(path)?;
    let owner_off = owner.is_some_and(|o| o != current_owner);
    let group_off = group.is_some_and(|g| g != current_group);
    if owner_off || group_off {
        Ok(Some(format!(
            "owner {current_owner}:{current_group} -> {}:{}",
            owner.unwrap_or(&current_owner),
            group.unwrap_or(&current_group)
        )))
    } else {
        Ok(None)
    }
}
