//! Directory provider

use anyhow::{Context, Result, bail};
use convergence::{
    Action, ApplyOutcome, CurrentState, DirectorySpec, Provider, ResourceDeclaration, ResourceSpec,
};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Creates directories with ownership and mode
pub struct DirectoryProvider;

impl DirectoryProvider {
    fn attrs(decl: &ResourceDeclaration) -> Result<&DirectorySpec> {
        let ResourceSpec::Directory(attrs) = &decl.spec else {
            bail!("{} is not a directory declaration", decl.id());
        };
        Ok(attrs)
    }

    fn path(decl: &ResourceDeclaration) -> PathBuf {
        crate::paths::expand(&decl.name)
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
}

impl Provider for DirectoryProvider {
    fn validate(&self, decl: &ResourceDeclaration, action: Action) -> Result<()> {
        let attrs = Self::attrs(decl)?;
        if let Some(mode) = &attrs.mode {
            super::validate_mode(mode)?;
        }
        match action {
            Action::Create | Action::Delete | Action::Nothing => Ok(()),
            other => bail!("directory provider cannot {other}"),
        }
    }

    fn check(&self, decl: &ResourceDeclaration, action: Action) -> Result<CurrentState> {
        let attrs = Self::attrs(decl)?;
        let path = Self::path(decl);
        match action {
            Action::Create => {
                if !path.is_dir() {
                    return Ok(CurrentState::divergent_because("missing"));
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
            other => bail!("directory provider cannot {other}"),
        }
    }

    fn apply(&self, decl: &ResourceDeclaration, action: Action) -> Result<ApplyOutcome> {
        let attrs = Self::attrs(decl)?;
        let path = Self::path(decl);
        match action {
            Action::Create => {
                let mut outcome = ApplyOutcome::Unchanged;
                if !path.is_dir() {
                    if attrs.recursive {
                        fs::create_dir_all(&path)
                    } else {
                        fs::create_dir(&path)
                    }
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                    outcome = ApplyOutcome::Created;
                }

                if let Some(mode) = &attrs.mode
                    && Self::mode_drift(&path, mode)?.is_some()
                {
                    let bits = super::parse_mode(mode)?;
                    fs::set_permissions(&path, fs::Permissions::from_mode(bits))
                        .with_context(|| format!("Failed to chmod {}", path.display()))?;
                    if outcome == ApplyOutcome::Unchanged {
                        outcome = ApplyOutcome::Modified;
                    }
                }

                if super::owner_drift(&path, attrs.owner.as_deref(), attrs.group.as_deref())?
                    .is_some()
                {
                    super::chown(&path, attrs.owner.as_deref(), attrs.group.as_deref(), false)?;
                    if outcome == ApplyOutcome::Unchanged {
                        outcome = ApplyOutcome::Modified;
                    }
                }
                Ok(outcome)
            }
            Action::Delete => {
                if !path.exists() {
                    return Ok(ApplyOutcome::Unchanged);
                }
                fs::remove_dir_all(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
                Ok(ApplyOutcome::Removed)
            }
            other => bail!("directory provider cannot {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(path: &Path, attrs: DirectorySpec) -> ResourceDeclaration {
        ResourceDeclaration::new(
            path.to_string_lossy().to_string(),
            ResourceSpec::Directory(attrs),
        )
    }

    #[test]
    fn create_then_recheck_converges() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("opt").join("app");
        let decl = decl(
            &target,
            DirectorySpec {
                recursive: true,
                mode: Some("0755".into()),
                ..DirectorySpec::default()
            },
        );

        assert!(matches!(
            DirectoryProvider.check(&decl, Action::Create).unwrap(),
            CurrentState::Divergent { .. }
        ));
        assert_eq!(
            DirectoryProvider.apply(&decl, Action::Create).unwrap(),
            ApplyOutcome::Created
        );
        assert!(
            DirectoryProvider
                .check(&decl, Action::Create)
                .unwrap()
                .is_converged()
        );
        // re-apply is a no-op
        assert_eq!(
            DirectoryProvider.apply(&decl, Action::Create).unwrap(),
            ApplyOutcome::Unchanged
        );
    }

    #[test]
    fn mode_drift_is_detected_and_fixed() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("data");
        fs::create_dir(&target).unwrap();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o700)).unwrap();

        let decl = decl(
            &target,
            DirectorySpec {
                mode: Some("0755".into()),
                ..DirectorySpec::default()
            },
        );

        match DirectoryProvider.check(&decl, Action::Create).unwrap() {
            CurrentState::Divergent { summary } => {
                assert!(summary.unwrap().contains("mode"));
            }
            CurrentState::Converged => panic!("expected mode drift"),
        }

        assert_eq!(
            DirectoryProvider.apply(&decl, Action::Create).unwrap(),
            ApplyOutcome::Modified
        );
        assert!(
            DirectoryProvider
                .check(&decl, Action::Create)
                .unwrap()
                .is_converged()
        );
    }

    #[test]
    fn delete_removes_and_then_converges() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("stale");
        fs::create_dir(&target).unwrap();

        let decl = decl(&target, DirectorySpec::default()).with_action(Action::Delete);
        assert_eq!(
            DirectoryProvider.apply(&decl, Action::Delete).unwrap(),
            ApplyOutcome::Removed
        );
        assert!(
            DirectoryProvider
                .check(&decl, Action::Delete)
                .unwrap()
                .is_converged()
        );
    }

    #[test]
    fn bad_mode_fails_validation() {
        let root = tempfile::tempdir().unwrap();
        let decl = decl(
            &root.path().join("x"),
            DirectorySpec {
                mode: Some("u+rwx".into()),
                ..DirectorySpec::default()
            },
        );
        assert!(DirectoryProvider.validate(&decl, Action::Create).is_err());
    }
}
