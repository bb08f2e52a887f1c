//! Provider dispatch - maps resource types to check/apply implementations
//!
//! A provider owns the semantics of one resource type. The engine only
//! relies on the two-method capability: `check` inspects the live system,
//! `apply` performs the minimal convergence step and must be safe to re-run.

use crate::error::{Error, Result};
use crate::resource::ResourceDeclaration;
use crate::spec::ResourceType;
use crate::types::{Action, ApplyOutcome, CurrentState};
use std::collections::BTreeMap;

/// Check/apply capability for one resource type
///
/// `action` is passed separately from the declaration because a notified
/// resource runs the action the notification requested, which may differ
/// from the one it declared.
pub trait Provider: Send + Sync {
    /// Validate a declaration's attributes for this type
    ///
    /// Called before any execution; a declaration that fails validation
    /// never reaches `check` or `apply`.
    fn validate(&self, _decl: &ResourceDeclaration, _action: Action) -> anyhow::Result<()> {
        Ok(())
    }

    /// Inspect the live system: does desired state already hold?
    fn check(&self, decl: &ResourceDeclaration, action: Action) -> anyhow::Result<CurrentState>;

    /// Converge the system toward desired state
    ///
    /// Must be idempotent: applying an already-converged resource reports
    /// `ApplyOutcome::Unchanged` rather than failing or redoing work.
    fn apply(&self, decl: &ResourceDeclaration, action: Action) -> anyhow::Result<ApplyOutcome>;
}

/// Registry of providers keyed by resource type
#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<ResourceType, Box<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the provider for a type, replacing any previous one
    pub fn register(&mut self, rtype: ResourceType, provider: Box<dyn Provider>) {
        self.providers.insert(rtype, provider);
    }

    /// Resolve the provider for a type
    pub fn resolve(&self, rtype: ResourceType) -> Result<&dyn Provider> {
        self.providers
            .get(&rtype)
            .map(Box::as_ref)
            .ok_or(Error::UnknownResourceType { rtype })
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
