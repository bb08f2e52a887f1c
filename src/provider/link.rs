//! Symlink provider
//!
//! Wrong-target links are replaced; a regular file sitting at the link
//! path is never clobbered.

use anyhow::{Context, Result, bail};
use convergence::{
    Action, ApplyOutcome, CurrentState, LinkSpec, Provider, ResourceDeclaration, ResourceSpec,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
enum LinkState {
    Missing,
    Correct,
    WrongTarget(PathBuf),
    FileInTheWay,
}

/// Creates and repairs symlinks
pub struct LinkProvider;

impl LinkProvider {
    fn attrs(decl: &ResourceDeclaration) -> Result<&LinkSpec> {
        let ResourceSpec::Link(attrs) = &decl.spec else {
            bail!("{} is not a link declaration", decl.id());
        };
        Ok(attrs)
    }

    fn paths(decl: &ResourceDeclaration, attrs: &LinkSpec) -> (PathBuf, PathBuf) {
        (
            crate::paths::expand(&decl.name),
            crate::paths::expand(&attrs.to.to_string_lossy()),
        )
    }

    fn current(link: &Path, to: &Path) -> Result<LinkState> {
        if !link.exists() && !link.is_symlink() {
            return Ok(LinkState::Missing);
        }
        if !link.is_symlink() {
            return Ok(LinkState::FileInTheWay);
        }

        let pointed = fs::read_link(link)
            .with_context(|| format!("Failed to read link {}", link.display()))?;
        let expected = to.canonicalize().unwrap_or_else(|_| to.to_path_buf());
        let actual = if pointed.is_absolute() {
            pointed.canonicalize().unwrap_or(pointed)
        } else {
            link.parent()
                .map(|p| p.join(&pointed))
                .and_then(|p| p.canonicalize().ok())
                .unwrap_or(pointed)
        };

        if expected == actual {
            Ok(LinkState::Correct)
        } else {
            Ok(LinkState::WrongTarget(actual))
        }
    }

    fn create(link: &Path, to: &Path) -> Result<()> {
        if let Some(parent) = link.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        if link.is_symlink() {
            fs::remove_file(link)
                .with_context(|| format!("Failed to remove old link {}", link.display()))?;
        }
        std::os::unix::fs::symlink(to, link).with_context(|| {
            format!("Failed to link {} -> {}", link.display(), to.display())
        })
    }
}

impl Provider for LinkProvider {
    fn validate(&self, decl: &ResourceDeclaration, action: Action) -> Result<()> {
        Self::attrs(decl)?;
        match action {
            Action::Create | Action::Delete | Action::Nothing => Ok(()),
            other => bail!("link provider cannot {other}"),
        }
    }

    fn check(&self, decl: &ResourceDeclaration, action: Action) -> Result<CurrentState> {
        let attrs = Self::attrs(decl)?;
        let (link, to) = Self::paths(decl, attrs);
        match action {
            Action::Create => Ok(match Self::current(&link, &to)? {
                LinkState::Correct => CurrentState::Converged,
                LinkState::Missing => CurrentState::divergent_because("missing"),
                LinkState::WrongTarget(actual) => CurrentState::divergent_because(format!(
                    "points at {} instead of {}",
                    actual.display(),
                    to.display()
                )),
                LinkState::FileInTheWay => {
                    CurrentState::divergent_because("a regular file is in the way")
                }
            }),
            Action::Delete => Ok(if link.is_symlink() {
                CurrentState::divergent_because("present")
            } else {
                CurrentState::Converged
            }),
            other => bail!("link provider cannot {other}"),
        }
    }

    fn apply(&self, decl: &ResourceDeclaration, action: Action) -> Result<ApplyOutcome> {
        let attrs = Self::attrs(decl)?;
        let (link, to) = Self::paths(decl, attrs);
        match action {
            Action::Create => match Self::current(&link, &to)? {
                LinkState::Correct => Ok(ApplyOutcome::Unchanged),
                LinkState::Missing => {
                    Self::create(&link, &to)?;
                    Ok(ApplyOutcome::Created)
                }
                LinkState::WrongTarget(_) => {
                    Self::create(&link, &to)?;
                    Ok(ApplyOutcome::Modified)
                }
                LinkState::FileInTheWay => {
                    bail!(
                        "refusing to replace regular file {} with a link",
                        link.display()
                    );
                }
            },
            Action::Delete => {
                if !link.is_symlink() {
                    return Ok(ApplyOutcome::Unchanged);
                }
                fs::remove_file(&link)
                    .with_context(|| format!("Failed to remove {}", link.display()))?;
                Ok(ApplyOutcome::Removed)
            }
            other => bail!("link provider cannot {other}"),
        }
    }
}
