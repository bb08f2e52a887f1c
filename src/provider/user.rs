//! System user provider
//!
//! Presence is the managed state: an account that already exists is left
//! alone rather than reconciled field by field.

use anyhow::{Context, Result, bail};
use convergence::{
    Action, ApplyOutcome, CurrentState, Provider, ResourceDeclaration, ResourceSpec, UserSpec,
};
use std::process::{Command, Stdio};

/// Creates and deletes system user accounts
pub struct UserProvider;

impl UserProvider {
    fn exists(name: &str) -> Result<bool> {
        let status = Command::new("getent")
            .args(["passwd", name])
            .stdout(Stdio::null())
            .status()
            .context("Failed to run getent")?;
        Ok(status.success())
    }

    fn create(name: &str, attrs: &UserSpec) -> Result<()> {
        let mut cmd = Command::new("useradd");
        if attrs.system {
            cmd.arg("--system");
        }
        if attrs.manage_home {
            cmd.arg("--create-home");
        }
        if let Some(home) = &attrs.home {
            cmd.arg("--home-dir").arg(home);
        }
        if let Some(shell) = &attrs.shell {
            cmd.args(["--shell", shell]);
        }
        if let Some(comment) = &attrs.comment {
            cmd.args(["--comment", comment]);
        }
        let output = cmd.arg(name).output().context("Failed to run useradd")?;
        if !output.status.success() {
            bail!(
                "useradd {name} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    fn delete(name: &str, remove_home: bool) -> Result<()> {
        let mut cmd = Command::new("userdel");
        if remove_home {
            cmd.arg("--remove");
        }
        let output = cmd.arg(name).output().context("Failed to run userdel")?;
        if !output.status.success() {
            bail!(
                "userdel {name} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

impl Provider for UserProvider {
    fn validate(&self, decl: &ResourceDeclaration, action: Action) -> Result<()> {
        let ResourceSpec::User(_) = &decl.spec else {
            bail!("{} is not a user declaration", decl.id());
        };
        match action {
            Action::Create | Action::Delete | Action::Nothing => Ok(()),
            other => bail!("user provider cannot {other}"),
        }
    }

    fn check(&self, decl: &ResourceDeclaration, action: Action) -> Result<CurrentState> {
        let exists = Self::exists(&decl.name)?;
        match action {
            Action::Create => Ok(if exists {
                CurrentState::Converged
            } else {
                CurrentState::divergent_because("absent")
            }),
            Action::Delete => Ok(if exists {
                CurrentState::divergent_because("present")
            } else {
                CurrentState::Converged
            }),
            other => bail!("user provider cannot {other}"),
        }
    }

    fn apply(&self, decl: &ResourceDeclaration, action: Action) -> Result<ApplyOutcome> {
        let ResourceSpec::User(attrs) = &decl.spec else {
            bail!("{} is not a user declaration", decl.id());
        };
        match action {
            Action::Create => {
                if Self::exists(&decl.name)? {
                    return Ok(ApplyOutcome::Unchanged);
                }
                Self::create(&decl.name, attrs)?;
                Ok(ApplyOutcome::Created)
            }
            Action::Delete => {
                if !Self::exists(&decl.name)? {
                    return Ok(ApplyOutcome::Unchanged);
                }
                Self::delete(&decl.name, attrs.manage_home)?;
                Ok(ApplyOutcome::Removed)
            }
            other => bail!("user provider cannot {other}"),
        }
    }
}
