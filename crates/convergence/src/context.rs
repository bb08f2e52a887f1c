//! Injection traits for the executor's system touchpoints
//!
//! Guard evaluation and progress reporting stay behind traits so the engine
//! can run against a real host, a test double, or nothing at all.

use crate::resource::{GuardCheck, ResourceId};
use crate::types::Action;

/// Evaluates guard checks against the live system
pub trait GuardEvaluator: Send + Sync {
    /// Evaluate a check to its boolean verdict
    ///
    /// An `Err` is not a `false`: it means the predicate itself could not
    /// be evaluated, which fails the resource.
    fn evaluate(&self, check: &GuardCheck) -> anyhow::Result<bool>;
}

/// Receives per-resource progress during a run
pub trait RunProgress {
    /// A resource is about to be converged with the given action
    fn on_resource_start(&mut self, id: &ResourceId, action: Action);

    /// A resource reached a terminal state for this visit
    fn on_resource_complete(&mut self, id: &ResourceId, outcome: &crate::report::Outcome);
}

/// No-op progress sink
pub struct NoProgress;

impl RunProgress for NoProgress {
    fn on_resource_start(&mut self, _id: &ResourceId, _action: Action) {}
    fn on_resource_complete(&mut self, _id: &ResourceId, _outcome: &crate::report::Outcome) {}
}
