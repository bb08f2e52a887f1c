//! Managed file provider
//!
//! Content is compared by hash; the drift summary carries short content
//! fingerprints and a line-level delta so plan output stays readable even
//! for large files.

use anyhow::{Context, Result, bail};
use convergence::{
    Action, ApplyOutcome, CurrentState, FileSpec, Provider, ResourceDeclaration, ResourceSpec,
};
use similar::{ChangeTag, TextDiff};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Writes files with managed content, ownership and mode
pub struct FileProvider;

impl FileProvider {
    fn attrs(decl: &ResourceDeclaration) -> Result<&FileSpec> {
        let ResourceSpec::File(attrs) = &decl.spec else {
            bail!("{} is not a file declaration", decl.id());
        };
        Ok(attrs)
    }

    fn path(decl: &ResourceDeclaration) -> PathBuf {
        crate::paths::expand(&decl.name)
    }

    fn content_drift(path: &Path, desired: &str) -> Result<Option<String>> {
        let current = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if current == desired {
            return Ok(None);
        }

        let diff = TextDiff::from_lines(current.as_str(), desired);
        let mut added = 0;
        let mut removed = 0;
        for change in diff.iter_all_changes() {
            match change.tag() {
                ChangeTag::Insert => added += 1,
                ChangeTag::Delete => removed += 1,
                ChangeTag::Equal => {}
            }
        }
        let have = blake3::hash(current.as_bytes()).to_hex();
        let want = blake3::hash(desired.as_bytes()).to_hex();
        Ok(Some(format!(
            "content {}.. -> {}.. (+{added} -{removed} lines)",
            &have.as_str()[..8],
            &want.as_str()[..8]
        )))
    }

    fn mode_drift(path: &Path, mode: &str) -> Result<Option<String>> {
        let want = super::parse_mode(mode)?;
        let have = fs::metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .permissions()
            .mode()
            & 0o7777;
        Ok((have != want).then(|| format!("mode {have:04o} -> {want:04o}")))
    }

    fn write(path: &Path, attrs: &FileSpec) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(path, attrs.content.as_deref().unwrap_or(""))
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    fn settle_metadata(path: &Path, attrs: &FileSpec, outcome: &mut ApplyOutcome) -> Result<()> {
        if let Some(mode) = &attrs.mode
            && Self::mode_drift(path, mode)?.is_some()
        {
            let bits = super::parse_mode(mode)?;
            fs::set_permissions(path, fs::Permissions::from_mode(bits))
                .with_context(|| format!("Failed to chmod {}", path.display()))?;
            if *outcome == ApplyOutcome::Unchanged {
                *outcome = ApplyOutcome::Modified;
            }
        }
        if super::owner_drift(path, attrs.owner.as_deref(), attrs.group.as_deref())?.is_some() {
            super::chown(path, attrs.owner.as_deref(), attrs.group.as_deref(), false)?;
            if *outcome == ApplyOutcome::Unchanged {
                *outcome = ApplyOutcome::Modified;
            }
        }
        Ok(())
    }
}

impl Provider for FileProvider {
    fn validate(&self, decl: &ResourceDeclaration, action: Action) -> Result<()> {
        let attrs = Self::attrs(decl)?;
        if let Some(mode) = &attrs.mode {
            super::validate_mode(mode)?;
        }
        match action {
            Action::Create | Action::CreateIfMissing | Action::Delete | Action::Nothing => Ok(()),
            other => bail!("file provider cannot {other}"),
        }
    }

    fn check(&self, decl: &ResourceDeclaration, action: Action) -> Result<CurrentState> {
        let attrs = Self::attrs(decl)?;
        let path = Self::path(decl);
        match action {
            Action::Create | Action::CreateIfMissing => {
                if !path.is_file() {
                    return Ok(CurrentState::divergent_because("missing"));
                }
                // create_if_missing never rewrites an existing file
                if action == Action::Create
                    && let Some(content) = &attrs.content
                    && let Some(drift) = Self::content_drift(&path, content)?
                {
                    return Ok(CurrentState::divergent_because(drift));
                }
                if let Some(mode) = &attrs.mode
                    && let Some(drift) = Self::mode_drift(&path, mode)?
                {
                    return Ok(CurrentState::divergent_because(drift));
                }
                if let Some(drift) =
                    super::owner_drift(&path, attrs.owner.as_deref(), attrs.group.as_deref())?
                {
                    return Ok(CurrentState::divergent_because(drift));
                }
                Ok(CurrentState::Converged)
            }
            Action::Delete => Ok(if path.exists() {
                CurrentState::divergent_because("present")
            } else {
                CurrentState::Converged
            }),
            other => bail!("file provider cannot {other}"),
        }
    }

    fn apply(&self, decl: &ResourceDeclaration, action: Action) -> Result<ApplyOutcome> {
        let attrs = Self::attrs(decl)?;
        let path = Self::path(decl);
        match action {
            Action::Create | Action::CreateIfMissing => {
                let mut outcome = ApplyOutcome::Unchanged;
                if !path.is_file() {
                    Self::write(&path, attrs)?;
                    outcome = ApplyOutcome::Created;
                } else if action == Action::Create
                    && let Some(content) = &attrs.content
                    && Self::content_drift(&path, content)?.is_some()
                {
                    Self::write(&path, attrs)?;
                    outcome = ApplyOutcome::Modified;
                }
                Self::settle_metadata(&path, attrs, &mut outcome)?;
                Ok(outcome)
            }
            Action::Delete => {
                if !path.exists() {
                    return Ok(ApplyOutcome::Unchanged);
                }
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
                Ok(ApplyOutcome::Removed)
            }
            other => bail!("file provider cannot {other}"),
        }
    }
}
