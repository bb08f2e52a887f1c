//! Run report - per-resource outcomes and overall run status

use crate::resource::ResourceId;
use serde::{Deserialize, Serialize};

/// Terminal outcome of one resource for the whole run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    /// Desired state already held; no action taken
    Unchanged,
    /// The apply action changed system state
    Updated,
    /// A guard predicate kept the resource from running
    Skipped { reason: String },
    /// Guard, check or apply failed
    Failed { error: String },
    /// The run halted before reaching this resource
    NotRun,
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// One line of the run report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub resource: ResourceId,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Overall status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Converged,
    Failed,
}

/// Ordered per-resource outcomes for a run
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub entries: Vec<ReportEntry>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, resource: ResourceId, outcome: Outcome) {
        self.entries.push(ReportEntry { resource, outcome });
    }

    pub fn status(&self) -> RunStatus {
        if self.entries.iter().any(|e| e.outcome.is_failure()) {
            RunStatus::Failed
        } else {
            RunStatus::Converged
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == RunStatus::Converged
    }

    /// Process exit status: 0 when no resource failed
    pub fn exit_code(&self) -> i32 {
        match self.status() {
            RunStatus::Converged => 0,
            RunStatus::Failed => 1,
        }
    }

    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Updated))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Unchanged))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed { .. }))
    }

    pub fn not_run(&self) -> usize {
        self.count(|o| matches!(o, Outcome::NotRun))
    }

    /// Look up the outcome recorded for a resource
    pub fn outcome_of(&self, resource: &ResourceId) -> Option<&Outcome> {
        self.entries
            .iter()
            .find(|e| &e.resource == resource)
            .map(|e| &e.outcome)
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.outcome)).count()
    }
}
