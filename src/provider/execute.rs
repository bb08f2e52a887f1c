//! Shell command provider
//!
//! A command is never idempotent on its own: check always reports
//! divergence, and idempotence comes from the guards the manifest attaches
//! (`not_if "pip list | grep Flask"` and the like).

use anyhow::{Context, Result, bail};
use convergence::{
    Action, ApplyOutcome, CurrentState, ExecuteSpec, Provider, ResourceDeclaration, ResourceSpec,
};
use std::process::Command;

/// Runs one-shot shell commands
pub struct ExecuteProvider;

impl ExecuteProvider {
    fn attrs(decl: &ResourceDeclaration) -> Result<&ExecuteSpec> {
        let ResourceSpec::Execute(attrs) = &decl.spec else {
            bail!("{} is not an execute declaration", decl.id());
        };
        Ok(attrs)
    }

    fn command(attrs: &ExecuteSpec) -> Command {
        let mut cmd = match &attrs.user {
            Some(user) => {
                let mut c = Command::new("sudo");
                // --preserve-env keeps the declared environment visible
                // to the target user
                c.args(["--preserve-env", "-u", user, "sh", "-c", &attrs.command]);
                c
            }
            None => {
                let mut c = Command::new("sh");
                c.args(["-c", &attrs.command]);
                c
            }
        };
        if let Some(cwd) = &attrs.cwd {
            cmd.current_dir(crate::paths::expand(&cwd.to_string_lossy()));
        }
        for (key, value) in &attrs.environment {
            cmd.env(key, value);
        }
        cmd
    }
}

impl Provider for ExecuteProvider {
    fn validate(&self, decl: &ResourceDeclaration, action: Action) -> Result<()> {
        let attrs = Self::attrs(decl)?;
        if attrs.command.trim().is_empty() {
            bail!("{} declares an empty command", decl.id());
        }
        match action {
            Action::Run | Action::Nothing => Ok(()),
            other => bail!("execute provider cannot {other}"),
        }
    }

    fn check(&self, decl: &ResourceDeclaration, action: Action) -> Result<CurrentState> {
        Self::attrs(decl)?;
        match action {
            Action::Run => Ok(CurrentState::divergent_because("command runs unless guarded")),
            other => bail!("execute provider cannot {other}"),
        }
    }

    fn apply(&self, decl: &ResourceDeclaration, action: Action) -> Result<ApplyOutcome> {
        let attrs = Self::attrs(decl)?;
        match action {
            Action::Run => {
                let output = Self::command(attrs)
                    .output()
                    .with_context(|| format!("Failed to run `{}`", attrs.command))?;
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    bail!(
                        "`{}` exited {}: {}",
                        attrs.command,
                        output.status,
                        stderr.trim()
                    );
                }
                let stdout = String::from_utf8_lossy(&output.stdout);
                if !stdout.trim().is_empty() {
                    log::debug!("`{}` output: {}", attrs.command, stdout.trim());
                }
                Ok(ApplyOutcome::Executed)
            }
            other => bail!("execute provider cannot {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn decl(command: &str, cwd: Option<PathBuf>) -> ResourceDeclaration {
        ResourceDeclaration::new(
            "step",
            ResourceSpec::Execute(ExecuteSpec {
                command: command.to_string(),
                cwd,
                user: None,
                environment: BTreeMap::new(),
            }),
        )
    }

    #[test]
    fn successful_command_reports_executed() {
        let root = tempfile::tempdir().unwrap();
        let marker = root.path().join("ran");
        let decl = decl(&format!("touch {}", marker.display()), None);

        assert_eq!(
            ExecuteProvider.apply(&decl, Action::Run).unwrap(),
            ApplyOutcome::Executed
        );
        assert!(marker.exists());
    }

    #[test]
    fn failing_command_surfaces_stderr() {
        let decl = decl("echo nope >&2; exit 7", None);
        let err = ExecuteProvider.apply(&decl, Action::Run).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("nope"));
        assert!(msg.contains("exit"));
    }

    #[test]
    fn cwd_and_environment_reach_the_command() {
        let root = tempfile::tempdir().unwrap();
        let decl = ResourceDeclaration::new(
            "env-step",
            ResourceSpec::Execute(ExecuteSpec {
                command: "echo $DEPLOY_STAGE > stage".into(),
                cwd: Some(root.path().to_path_buf()),
                user: None,
                environment: BTreeMap::from([("DEPLOY_STAGE".into(), "prod".into())]),
            }),
        );

        ExecuteProvider.apply(&decl, Action::Run).unwrap();
        let written = std::fs::read_to_string(root.path().join("stage")).unwrap();
        assert_eq!(written.trim(), "prod");
    }

    #[test]
    fn check_is_always_divergent() {
        let decl = decl("true", None);
        assert!(matches!(
            ExecuteProvider.check(&decl, Action::Run).unwrap(),
            CurrentState::Divergent { .. }
        ));
    }

    #[test]
    fn empty_command_fails_validation() {
        let decl = decl("  ", None);
        assert!(ExecuteProvider.validate(&decl, Action::Run).is_err());
    }
}
