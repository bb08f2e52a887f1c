//! Core types for the convergence engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Action a resource declaration requests from its provider
///
/// Actions are shared across resource types; each provider accepts the
/// subset that makes sense for it and rejects the rest during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Install a package
    Install,
    /// Remove a package
    Remove,
    /// Create the resource (user, group, directory, file, link)
    Create,
    /// Create the resource only when it does not exist yet; never rewrite
    CreateIfMissing,
    /// Delete the resource
    Delete,
    /// Check out a git revision
    Checkout,
    /// Run a command
    Run,
    /// Start a service
    Start,
    /// Stop a service
    Stop,
    /// Restart a service
    Restart,
    /// Reload a service
    Reload,
    /// Do nothing in the main walk; only act when notified
    Nothing,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Install => "install",
            Self::Remove => "remove",
            Self::Create => "create",
            Self::CreateIfMissing => "create_if_missing",
            Self::Delete => "delete",
            Self::Checkout => "checkout",
            Self::Run => "run",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Reload => "reload",
            Self::Nothing => "nothing",
        };
        write!(f, "{s}")
    }
}

/// When a notification's target runs relative to its trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyTiming {
    /// Run the target right after the trigger's apply, before the walk resumes
    Immediately,
    /// Queue the target for after the main walk; runs at most once
    Delayed,
}

impl fmt::Display for NotifyTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediately => write!(f, "immediately"),
            Self::Delayed => write!(f, "delayed"),
        }
    }
}

/// What a provider's check found on the live system
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrentState {
    /// Desired state already holds; apply is not needed
    Converged,
    /// Desired state does not hold yet
    Divergent {
        /// Short human-readable account of the drift
        summary: Option<String>,
    },
}

impl CurrentState {
    /// Divergent state without a drift summary
    pub fn divergent() -> Self {
        Self::Divergent { summary: None }
    }

    /// Divergent state with a drift summary
    pub fn divergent_because(summary: impl Into<String>) -> Self {
        Self::Divergent {
            summary: Some(summary.into()),
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }
}

/// What a provider's apply did to the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// Nothing had to change
    Unchanged,
    /// Resource was created
    Created,
    /// Resource was modified in place
    Modified,
    /// Resource was removed
    Removed,
    /// A one-shot action ran (command, service restart)
    Executed,
}

impl ApplyOutcome {
    /// Whether the apply mutated system state
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}
