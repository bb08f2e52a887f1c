//! Distro package provider
//!
//! Backend (apt or dnf) is detected once when the provider is built.

use anyhow::{Context, Result, bail};
use convergence::{
    Action, ApplyOutcome, CurrentState, Provider, ResourceDeclaration, ResourceSpec,
};
use std::process::Command;

/// Which package manager drives this host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Apt,
    Dnf,
}

impl Backend {
    fn detect() -> Option<Self> {
        if binary_exists("apt-get") {
            Some(Self::Apt)
        } else if binary_exists("dnf") {
            Some(Self::Dnf)
        } else {
            None
        }
    }
}

fn binary_exists(name: &str) -> bool {
    Command::new("sh")
        .args(["-c", &format!("command -v {name}")])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Installs and removes distro packages
pub struct PackageProvider {
    backend: Option<Backend>,
}

impl PackageProvider {
    pub fn detect() -> Self {
        let backend = Backend::detect();
        match backend {
            Some(b) => log::debug!("package backend: {b:?}"),
            None => log::debug!("no supported package manager found"),
        }
        Self { backend }
    }

    fn backend(&self) -> Result<Backend> {
        self.backend
            .ok_or_else(|| anyhow::anyhow!("no supported package manager found (apt-get or dnf)"))
    }

    fn is_installed(&self, name: &str) -> Result<bool> {
        match self.backend()? {
            Backend::Apt => {
                let output = Command::new("dpkg-query")
                    .args(["-W", "-f=${Status}", name])
                    .output()
                    .context("Failed to run dpkg-query")?;
                Ok(output.status.success()
                    && String::from_utf8_lossy(&output.stdout).contains("install ok installed"))
            }
            Backend::Dnf => {
                let status = Command::new("rpm")
                    .args(["-q", name])
                    .output()
                    .context("Failed to run rpm")?
                    .status;
                Ok(status.success())
            }
        }
    }

    fn install(&self, name: &str, version: Option<&str>) -> Result<()> {
        let (cmd, pkg) = match self.backend()? {
            Backend::Apt => (
                "apt-get",
                version.map_or_else(|| name.to_string(), |v| format!("{name}={v}")),
            ),
            Backend::Dnf => (
                "dnf",
                version.map_or_else(|| name.to_string(), |v| format!("{name}-{v}")),
            ),
        };
        let output = Command::new(cmd)
            .args(["install", "-y", &pkg])
            .output()
            .with_context(|| format!("Failed to run {cmd} install"))?;
        if !output.status.success() {
            bail!(
                "{cmd} install {pkg} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        let cmd = match self.backend()? {
            Backend::Apt => "apt-get",
            Backend::Dnf => "dnf",
        };
        let output = Command::new(cmd)
            .args(["remove", "-y", name])
            .output()
            .with_context(|| format!("Failed to run {cmd} remove"))?;
        if !output.status.success() {
            bail!(
                "{cmd} remove {name} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

impl Provider for PackageProvider {
    fn validate(&self, decl: &ResourceDeclaration, action: Action) -> Result<()> {
        let ResourceSpec::Package(_) = &decl.spec else {
            bail!("{} is not a package declaration", decl.id());
        };
        match action {
            Action::Install | Action::Remove | Action::Nothing => Ok(()),
            other => bail!("package provider cannot {other}"),
        }
    }

    fn check(&self, decl: &ResourceDeclaration, action: Action) -> Result<CurrentState> {
        let installed = self.is_installed(&decl.name)?;
        match action {
            Action::Install => Ok(if installed {
                CurrentState::Converged
            } else {
                CurrentState::divergent_because("not installed")
            }),
            Action::Remove => Ok(if installed {
                CurrentState::divergent_because("installed")
            } else {
                CurrentState::Converged
            }),
            other => bail!("package provider cannot {other}"),
        }
    }

    fn apply(&self, decl: &ResourceDeclaration, action: Action) -> Result<ApplyOutcome> {
        let ResourceSpec::Package(attrs) = &decl.spec else {
            bail!("{} is not a package declaration", decl.id());
        };
        match action {
            Action::Install => {
                if self.is_installed(&decl.name)? {
                    return Ok(ApplyOutcome::Unchanged);
                }
                self.install(&decl.name, attrs.version.as_deref())?;
                Ok(ApplyOutcome::Created)
            }
            Action::Remove => {
                if !self.is_installed(&decl.name)? {
                    return Ok(ApplyOutcome::Unchanged);
                }
                self.remove(&decl.name)?;
                Ok(ApplyOutcome::Removed)
            }
            other => bail!("package provider cannot {other}"),
        }
    }
}
