//! Guard evaluation against the live host
//!
//! Two check forms: a shell command whose exit status is the verdict, and a
//! file-existence test. Commands run through `sh -c`, optionally as another
//! user and in a working directory, matching how one-shot provisioning
//! steps are usually gated.

use anyhow::{Context, Result};
use convergence::{GuardCheck, GuardEvaluator};
use std::process::{Command, Stdio};

/// Evaluates guards by probing the host
pub struct HostGuards;

impl GuardEvaluator for HostGuards {
    fn evaluate(&self, check: &GuardCheck) -> Result<bool> {
        match check {
            GuardCheck::FileExists { path } => {
                let path = crate::paths::expand(&path.to_string_lossy());
                log::debug!("guard file_exists({}) = {}", path.display(), path.exists());
                Ok(path.exists())
            }
            GuardCheck::Command { command, cwd, user } => {
                let mut cmd = match user {
                    Some(user) => {
                        let mut c = Command::new("sudo");
                        c.args(["-u", user, "sh", "-c", command]);
                        c
                    }
                    None => {
                        let mut c = Command::new("sh");
                        c.args(["-c", command]);
                        c
                    }
                };
                if let Some(cwd) = cwd {
                    cmd.current_dir(crate::paths::expand(&cwd.to_string_lossy()));
                }

                let status = cmd
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status()
                    .with_context(|| format!("Failed to run guard command `{command}`"))?;
                log::debug!("guard `{command}` exited {status}");
                Ok(status.success())
            }
        }
    }
}
