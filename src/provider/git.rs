//! Git checkout provider
//!
//! Converged means: the destination is a clone of the repository with HEAD
//! at the declared revision. Without a declared revision only the presence
//! of the clone is managed.

use anyhow::{Context, Result, bail};
use convergence::{
    Action, ApplyOutcome, CurrentState, GitSpec, Provider, ResourceDeclaration, ResourceSpec,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Clones repositories and pins them to revisions
pub struct GitProvider;

impl GitProvider {
    fn attrs(decl: &ResourceDeclaration) -> Result<&GitSpec> {
        let ResourceSpec::Git(attrs) = &decl.spec else {
            bail!("{} is not a git declaration", decl.id());
        };
        Ok(attrs)
    }

    fn dest(decl: &ResourceDeclaration) -> PathBuf {
        crate::paths::expand(&decl.name)
    }

    fn is_repo(dest: &Path) -> bool {
        dest.join(".git").exists()
    }

    fn git(dest: Option<&Path>, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("git");
        if let Some(dest) = dest {
            cmd.arg("-C").arg(dest);
        }
        let output = cmd
            .args(args)
            .output()
            .with_context(|| format!("Failed to run git {}", args.join(" ")))?;
        if !output.status.success() {
            bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn head(dest: &Path) -> Result<String> {
        Self::git(Some(dest), &["rev-parse", "HEAD"])
    }

    /// Commit the revision resolves to locally, or None if unknown here
    fn resolve(dest: &Path, revision: &str) -> Option<String> {
        let spec = format!("{revision}^{{commit}}");
        Self::git(Some(dest), &["rev-parse", "--verify", "--quiet", &spec]).ok()
    }

    fn clone(repository: &str, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        Self::git(
            None,
            &["clone", repository, &dest.to_string_lossy()],
        )?;
        Ok(())
    }

    fn checkout(dest: &Path, revision: &str) -> Result<()> {
        // the revision may be remote-only until we fetch
        if Self::resolve(dest, revision).is_none() {
            Self::git(Some(dest), &["fetch", "origin"])?;
        }
        Self::git(Some(dest), &["checkout", revision])?;
        Ok(())
    }
}

impl Provider for GitProvider {
    fn validate(&self, decl: &ResourceDeclaration, action: Action) -> Result<()> {
        let attrs = Self::attrs(decl)?;
        if attrs.repository.is_empty() {
            bail!("{} declares an empty repository url", decl.id());
        }
        match action {
            Action::Checkout | Action::Delete | Action::Nothing => Ok(()),
            other => bail!("git provider cannot {other}"),
        }
    }

    fn check(&self, decl: &ResourceDeclaration, action: Action) -> Result<CurrentState> {
        let attrs = Self::attrs(decl)?;
        let dest = Self::dest(decl);
        match action {
            Action::Checkout => {
                if !Self::is_repo(&dest) {
                    return Ok(CurrentState::divergent_because("not cloned"));
                }
                let Some(revision) = &attrs.revision else {
                    return Ok(CurrentState::Converged);
                };
                match Self::resolve(&dest, revision) {
                    None => Ok(CurrentState::divergent_because(format!(
                        "revision {revision} not fetched"
                    ))),
                    Some(want) => {
                        let head = Self::head(&dest)?;
                        if head == want {
                            Ok(CurrentState::Converged)
                        } else {
                            Ok(CurrentState::divergent_because(format!(
                                "HEAD {}.. -> {}..",
                                &head[..head.len().min(8)],
                                &want[..want.len().min(8)]
                            )))
                        }
                    }
                }
            }
            Action::Delete => Ok(if dest.exists() {
                CurrentState::divergent_because("present")
            } else {
                CurrentState::Converged
            }),
            other => bail!("git provider cannot {other}"),
        }
    }

    fn apply(&self, decl: &ResourceDeclaration, action: Action) -> Result<ApplyOutcome> {
        let attrs = Self::attrs(decl)?;
        let dest = Self::dest(decl);
        match action {
            Action::Checkout => {
                let mut outcome = ApplyOutcome::Unchanged;
                if !Self::is_repo(&dest) {
                    Self::clone(&attrs.repository, &dest)?;
                    outcome = ApplyOutcome::Created;
                }
                if let Some(revision) = &attrs.revision {
                    let want = Self::resolve(&dest, revision);
                    let head = Self::head(&dest)?;
                    if want.as_deref() != Some(head.as_str()) {
                        Self::checkout(&dest, revision)?;
                        if outcome == ApplyOutcome::Unchanged {
                            outcome = ApplyOutcome::Modified;
                        }
                    }
                }
                if outcome.is_change() {
                    super::chown(&dest, attrs.user.as_deref(), attrs.group.as_deref(), true)?;
                }
                Ok(outcome)
            }
            Action::Delete => {
                if !dest.exists() {
                    return Ok(ApplyOutcome::Unchanged);
                }
                fs::remove_dir_all(&dest)
                    .with_context(|| format!("Failed to remove {}", dest.display()))?;
                Ok(ApplyOutcome::Removed)
            }
            other => bail!("git provider cannot {other}"),
        }
    }
}
