//! Service provider, backed by systemctl
//!
//! `start` also enables the unit at boot unless `enable = false`. Restart
//! and reload are one-shot actions: they always count as divergent because
//! the request itself is the reason to act.

use anyhow::{Context, Result, bail};
use convergence::{
    Action, ApplyOutcome, CurrentState, Provider, ResourceDeclaration, ResourceSpec, ServiceSpec,
};
use std::process::Command;

/// Starts, stops and reloads systemd units
pub struct ServiceProvider;

impl ServiceProvider {
    fn attrs(decl: &ResourceDeclaration) -> Result<&ServiceSpec> {
        let ResourceSpec::Service(attrs) = &decl.spec else {
            bail!("{} is not a service declaration", decl.id());
        };
        Ok(attrs)
    }

    fn probe(unit: &str, verb: &str) -> Result<bool> {
        let status = Command::new("systemctl")
            .args([verb, "--quiet", unit])
            .status()
            .context("Failed to run systemctl")?;
        Ok(status.success())
    }

    fn is_active(unit: &str) -> Result<bool> {
        Self::probe(unit, "is-active")
    }

    fn is_enabled(unit: &str) -> Result<bool> {
        Self::probe(unit, "is-enabled")
    }

    fn systemctl(verb: &str, unit: &str) -> Result<()> {
        let output = Command::new("systemctl")
            .args([verb, unit])
            .output()
            .context("Failed to run systemctl")?;
        if !output.status.success() {
            bail!(
                "systemctl {verb} {unit} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

impl Provider for ServiceProvider {
    fn validate(&self, decl: &ResourceDeclaration, action: Action) -> Result<()> {
        Self::attrs(decl)?;
        match action {
            Action::Start | Action::Stop | Action::Restart | Action::Reload | Action::Nothing => {
                Ok(())
            }
            other => bail!("service provider cannot {other}"),
        }
    }

    fn check(&self, decl: &ResourceDeclaration, action: Action) -> Result<CurrentState> {
        let attrs = Self::attrs(decl)?;
        let unit = &decl.name;
        match action {
            Action::Start => {
                if !Self::is_active(unit)? {
                    return Ok(CurrentState::divergent_because("not running"));
                }
                if attrs.enable && !Self::is_enabled(unit)? {
                    return Ok(CurrentState::divergent_because("not enabled at boot"));
                }
                Ok(CurrentState::Converged)
            }
            Action::Stop => Ok(if Self::is_active(unit)? {
                CurrentState::divergent_because("running")
            } else {
                CurrentState::Converged
            }),
            Action::Restart | Action::Reload => {
                Ok(CurrentState::divergent_because(format!("{action} requested")))
            }
            other => bail!("service provider cannot {other}"),
        }
    }

    fn apply(&self, decl: &ResourceDeclaration, action: Action) -> Result<ApplyOutcome> {
        let attrs = Self::attrs(decl)?;
        let unit = &decl.name;
        match action {
            Action::Start => {
                let mut outcome = ApplyOutcome::Unchanged;
                if attrs.enable && !Self::is_enabled(unit)? {
                    Self::systemctl("enable", unit)?;
                    outcome = ApplyOutcome::Modified;
                }
                if !Self::is_active(unit)? {
                    Self::systemctl("start", unit)?;
                    outcome = ApplyOutcome::Modified;
                }
                Ok(outcome)
            }
            Action::Stop => {
                if !Self::is_active(unit)? {
                    return Ok(ApplyOutcome::Unchanged);
                }
                Self::systemctl("stop", unit)?;
                Ok(ApplyOutcome::Modified)
            }
            Action::Restart => {
                Self::systemctl("restart", unit)?;
                Ok(ApplyOutcome::Executed)
            }
            Action::Reload => {
                Self::systemctl("reload", unit)?;
                Ok(ApplyOutcome::Executed)
            }
            other => bail!("service provider cannot {other}"),
        }
    }
}
