//! Error types for the convergence engine

use crate::resource::ResourceId;
use crate::spec::ResourceType;
use thiserror::Error;

type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while declaring or converging resources
#[derive(Error, Debug)]
pub enum Error {
    /// A (type, name) pair was registered twice
    #[error("duplicate resource: {resource}")]
    DuplicateResource { resource: ResourceId },

    /// A lookup or notification edge named an unregistered resource
    #[error("resource not found: {resource}")]
    ResourceNotFound { resource: ResourceId },

    /// No provider registered for a declared resource type
    #[error("no provider registered for resource type `{rtype}`")]
    UnknownResourceType { rtype: ResourceType },

    /// A notification edge would make a resource re-trigger itself
    #[error("notification cycle involving {resource}")]
    NotificationCycle { resource: ResourceId },

    /// A guard predicate itself failed to evaluate
    #[error("guard evaluation failed for {resource}: {source}")]
    GuardEvaluation {
        resource: ResourceId,
        #[source]
        source: DynError,
    },

    /// A provider's state check failed
    #[error("state check failed for {resource}: {source}")]
    ProviderCheck {
        resource: ResourceId,
        #[source]
        source: DynError,
    },

    /// A provider's apply action failed
    #[error("apply failed for {resource}: {source}")]
    ProviderApply {
        resource: ResourceId,
        #[source]
        source: DynError,
    },
}

impl Error {
    pub fn guard_evaluation(resource: ResourceId, source: anyhow::Error) -> Self {
        Self::GuardEvaluation {
            resource,
            source: source.into(),
        }
    }

    pub fn provider_check(resource: ResourceId, source: anyhow::Error) -> Self {
        Self::ProviderCheck {
            resource,
            source: source.into(),
        }
    }

    pub fn provider_apply(resource: ResourceId, source: anyhow::Error) -> Self {
        Self::ProviderApply {
            resource,
            source: source.into(),
        }
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;
