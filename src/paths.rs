//! Path resolution for converge
//!
//! # Environment Variables
//!
//! - `CONVERGE_CONFIG_DIR` - Override the config directory
//!
//! # Manifest Resolution Priority
//!
//! 1. Explicit path on the command line
//! 2. `./converge.toml` in the working directory
//! 3. `<config dir>/converge.toml`

use anyhow::{Context, Result, bail};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "CONVERGE_CONFIG_DIR";

/// Manifest file name looked up in default locations
pub const MANIFEST_FILE: &str = "converge.toml";

/// Get the converge config directory path
///
/// Priority:
/// 1. `CONVERGE_CONFIG_DIR` env var
/// 2. `XDG_CONFIG_HOME/converge`
/// 3. `~/.config/converge`
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!("using config dir from {}: {}", ENV_CONFIG_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("converge");
        log::debug!("using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("converge"))
}

/// Resolve the manifest path from an optional CLI argument
pub fn manifest_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if !path.exists() {
            bail!("manifest not found: {}", path.display());
        }
        return Ok(path);
    }

    let local = PathBuf::from(MANIFEST_FILE);
    if local.exists() {
        return Ok(local);
    }

    let fallback = config_dir()?.join(MANIFEST_FILE);
    if fallback.exists() {
        return Ok(fallback);
    }

    bail!(
        "no manifest found; expected ./{MANIFEST_FILE} or {}",
        fallback.display()
    );
}

/// Expand ~ and environment variables in a path string
///
/// The canonical path expansion function for converge; providers use this
/// instead of calling shellexpand directly.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_absolute_path_is_unchanged() {
        assert_eq!(expand("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn expand_tilde_points_into_home() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand("~/manifests"), home.join("manifests"));
    }

    #[test]
    fn expand_unknown_env_var_is_left_as_is() {
        let result = expand("/path/$CONVERGE_NONEXISTENT_VAR_9321/file");
        assert_eq!(
            result,
            PathBuf::from("/path/$CONVERGE_NONEXISTENT_VAR_9321/file")
        );
    }

    #[test]
    fn explicit_missing_manifest_is_an_error() {
        let err = manifest_path(Some(PathBuf::from("/definitely/not/here.toml"))).unwrap_err();
        assert!(err.to_string().contains("manifest not found"));
    }
}
