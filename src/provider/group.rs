//! System group provider
//!
//! Membership is managed: with `append` the declared members are added to
//! whoever is already there, otherwise the member list is authoritative.

use anyhow::{Context, Result, bail};
use convergence::{
    Action, ApplyOutcome, CurrentState, GroupSpec, Provider, ResourceDeclaration, ResourceSpec,
};
use std::collections::BTreeSet;
use std::process::Command;

/// Creates groups and manages their member lists
pub struct GroupProvider;

impl GroupProvider {
    /// Current members, or None when the group does not exist
    fn current_members(name: &str) -> Result<Option<Vec<String>>> {
        let output = Command::new("getent")
            .args(["group", name])
            .output()
            .context("Failed to run getent")?;
        if !output.status.success() {
            return Ok(None);
        }
        // getent line: name:x:gid:member,member
        let line = String::from_utf8_lossy(&output.stdout);
        let members = line
            .trim()
            .split(':')
            .nth(3)
            .unwrap_or("")
            .split(',')
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Some(members))
    }

    fn missing_members(attrs: &GroupSpec, current: &[String]) -> Vec<String> {
        let have: BTreeSet<_> = current.iter().map(String::as_str).collect();
        attrs
            .members
            .iter()
            .filter(|m| !have.contains(m.as_str()))
            .cloned()
            .collect()
    }

    fn create(name: &str, attrs: &GroupSpec) -> Result<()> {
        let mut cmd = Command::new("groupadd");
        if attrs.system {
            cmd.arg("--system");
        }
        let output = cmd.arg(name).output().context("Failed to run groupadd")?;
        if !output.status.success() {
            bail!(
                "groupadd {name} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    fn add_member(group: &str, member: &str) -> Result<()> {
        let output = Command::new("gpasswd")
            .args(["-a", member, group])
            .output()
            .context("Failed to run gpasswd")?;
        if !output.status.success() {
            bail!(
                "gpasswd -a {member} {group} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    fn set_members(group: &str, members: &[String]) -> Result<()> {
        let output = Command::new("gpasswd")
            .args(["-M", &members.join(","), group])
            .output()
            .context("Failed to run gpasswd")?;
        if !output.status.success() {
            bail!(
                "gpasswd -M failed for {group}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    fn delete(name: &str) -> Result<()> {
        let output = Command::new("groupdel")
            .arg(name)
            .output()
            .context("Failed to run groupdel")?;
        if !output.status.success() {
            bail!(
                "groupdel {name} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    fn members_converged(attrs: &GroupSpec, current: &[String]) -> bool {
        if attrs.append {
            Self::missing_members(attrs, current).is_empty()
        } else {
            let want: BTreeSet<_> = attrs.members.iter().collect();
            let have: BTreeSet<_> = current.iter().collect();
            want == have
        }
    }
}

impl Provider for GroupProvider {
    fn validate(&self, decl: &ResourceDeclaration, action: Action) -> Result<()> {
        let ResourceSpec::Group(_) = &decl.spec else {
            bail!("{} is not a group declaration", decl.id());
        };
        match action {
            Action::Create | Action::Delete | Action::Nothing => Ok(()),
            other => bail!("group provider cannot {other}"),
        }
    }

    fn check(&self, decl: &ResourceDeclaration, action: Action) -> Result<CurrentState> {
        let ResourceSpec::Group(attrs) = &decl.spec else {
            bail!("{} is not a group declaration", decl.id());
        };
        let current = Self::current_members(&decl.name)?;
        match action {
            Action::Create => match current {
                None => Ok(CurrentState::divergent_because("absent")),
                Some(members) if Self::members_converged(attrs, &members) => {
                    Ok(CurrentState::Converged)
                }
                Some(members) => Ok(CurrentState::divergent_because(format!(
                    "members [{}] -> [{}]",
                    members.join(","),
                    attrs.members.join(",")
                ))),
            },
            Action::Delete => Ok(if current.is_some() {
                CurrentState::divergent_because("present")
            } else {
                CurrentState::Converged
            }),
            other => bail!("group provider cannot {other}"),
        }
    }

    fn apply(&self, decl: &ResourceDeclaration, action: Action) -> Result<ApplyOutcome> {
        let ResourceSpec::Group(attrs) = &decl.spec else {
            bail!("{} is not a group declaration", decl.id());
        };
        match action {
            Action::Create => {
                let current = Self::current_members(&decl.name)?;
                let mut outcome = ApplyOutcome::Unchanged;

                let members = match current {
                    Some(members) => members,
                    None => {
                        Self::create(&decl.name, attrs)?;
                        outcome = ApplyOutcome::Created;
                        Vec::new()
                    }
                };

                if !Self::members_converged(attrs, &members) {
                    if attrs.append {
                        for member in Self::missing_members(attrs, &members) {
                            Self::add_member(&decl.name, &member)?;
                        }
                    } else {
                        Self::set_members(&decl.name, &attrs.members)?;
                    }
                    if outcome == ApplyOutcome::Unchanged {
                        outcome = ApplyOutcome::Modified;
                    }
                }
                Ok(outcome)
            }
            Action::Delete => {
                if Self::current_members(&decl.name)?.is_none() {
                    return Ok(ApplyOutcome::Unchanged);
                }
                Self::delete(&decl.name)?;
                Ok(ApplyOutcome::Removed)
            }
            other => bail!("group provider cannot {other}"),
        }
    }
}
