//! Resource declarations: identity, desired state, guards
//!
//! A declaration is pure data. What it means to converge one is the
//! provider's business; when and whether it runs is the executor's.

use crate::spec::{ResourceSpec, ResourceType};
use crate::types::Action;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Identity of a resource within a run: unique (type, name) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub rtype: ResourceType,
    pub name: String,
}

impl ResourceId {
    pub fn new(rtype: ResourceType, name: impl Into<String>) -> Self {
        Self {
            rtype,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.rtype, self.name)
    }
}

/// Which way a guard predicate gates its resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardKind {
    /// Run the resource only when the check is true
    OnlyIf,
    /// Skip the resource when the check is true
    NotIf,
}

/// The check a guard evaluates against the live system
///
/// Two forms: a shell command whose exit status is the verdict, and a
/// plain file-existence test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GuardCheck {
    Command {
        command: String,
        #[serde(default)]
        cwd: Option<PathBuf>,
        #[serde(default)]
        user: Option<String>,
    },
    FileExists {
        #[serde(rename = "file_exists")]
        path: PathBuf,
    },
}

impl fmt::Display for GuardCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command { command, .. } => write!(f, "`{command}`"),
            Self::FileExists { path } => write!(f, "file_exists({})", path.display()),
        }
    }
}

/// A guard predicate attached to a declaration
///
/// Evaluated when the executor reaches the resource, never earlier;
/// resources converged earlier in the same run may change the answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guard {
    pub kind: GuardKind,
    pub check: GuardCheck,
}

impl Guard {
    pub fn only_if(check: GuardCheck) -> Self {
        Self {
            kind: GuardKind::OnlyIf,
            check,
        }
    }

    pub fn not_if(check: GuardCheck) -> Self {
        Self {
            kind: GuardKind::NotIf,
            check,
        }
    }
}

/// A declared unit of desired system state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDeclaration {
    /// Name part of the identity; what it denotes depends on the type
    /// (package name, path, unit name, command label)
    pub name: String,
    /// Typed attributes
    pub spec: ResourceSpec,
    /// Requested action; the type's default when not declared
    pub action: Action,
    /// Guard predicates, evaluated in declaration order
    pub guards: Vec<Guard>,
    /// Log and continue instead of halting the run when this resource fails
    pub best_effort: bool,
}

impl ResourceDeclaration {
    pub fn new(name: impl Into<String>, spec: ResourceSpec) -> Self {
        let action = spec.default_action();
        Self {
            name: name.into(),
            spec,
            action,
            guards: Vec::new(),
            best_effort: false,
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    pub fn with_guard(mut self, guard: Guard) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn best_effort(mut self, best_effort: bool) -> Self {
        self.best_effort = best_effort;
        self
    }

    pub fn rtype(&self) -> ResourceType {
        self.spec.resource_type()
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(self.rtype(), self.name.clone())
    }
}
