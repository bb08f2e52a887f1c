//! # Convergence
//!
//! An idempotent convergence engine for host provisioning.
//!
//! Callers declare resources (desired system state) and notification edges,
//! register a provider per resource type, and ask the executor to converge
//! the host. The engine decides when each resource runs, memoizes what
//! already holds, and reports per-resource outcomes; what a resource
//! *means* is entirely the provider's business.
//!
//! ## Core Concepts
//!
//! - **ResourceDeclaration**: a declared unit of desired state, unique by
//!   (type, name), with an action and guard predicates
//! - **ResourceRegistry**: declarations in declaration order, which is the
//!   execution order
//! - **NotificationGraph**: explicit `notifies` edges with `immediately` or
//!   `delayed` timing
//! - **Provider**: check/apply capability for one resource type
//! - **Executor**: the sequential state machine that walks the registry,
//!   fires notifications and produces a [`RunReport`]
//!
//! ## Example
//!
//! ```ignore
//! use convergence::{
//!     Executor, NotificationGraph, ProviderRegistry, ResourceDeclaration,
//!     ResourceRegistry, ResourceSpec, RunOptions, NoProgress,
//! };
//!
//! let mut resources = ResourceRegistry::new();
//! resources.register(ResourceDeclaration::new(
//!     "nginx",
//!     ResourceSpec::Package(Default::default()),
//! ))?;
//!
//! let graph = NotificationGraph::new();
//! let providers: ProviderRegistry = build_providers();
//! let guards = my_guard_evaluator();
//!
//! let report = Executor::new(&providers, &guards).run(
//!     &resources,
//!     &graph,
//!     &RunOptions::default(),
//!     &mut NoProgress,
//! )?;
//! std::process::exit(report.exit_code());
//! ```
//!
//! ## Injection traits
//!
//! The engine touches the system only through traits:
//!
//! - [`Provider`]: check/apply for one resource type
//! - [`GuardEvaluator`]: evaluates `only_if`/`not_if` checks
//! - [`RunProgress`]: receives per-resource progress
//!
//! This keeps the engine free of any knowledge of package managers, shells
//! or service supervisors, and makes it fully testable with doubles.

pub mod context;
pub mod error;
pub mod executor;
pub mod graph;
pub mod provider;
pub mod registry;
pub mod report;
pub mod resource;
pub mod spec;
pub mod types;

// Re-export main types at crate root
pub use context::{GuardEvaluator, NoProgress, RunProgress};
pub use error::{Error, Result};
pub use executor::{Disposition, Executor, PlanEntry, RunOptions};
pub use graph::{Notification, NotificationGraph};
pub use provider::{Provider, ProviderRegistry};
pub use registry::ResourceRegistry;
pub use report::{Outcome, ReportEntry, RunReport, RunStatus};
pub use resource::{Guard, GuardCheck, GuardKind, ResourceDeclaration, ResourceId};
pub use spec::{
    DirectorySpec, ExecuteSpec, FileSpec, GitSpec, GroupSpec, LinkSpec, PackageSpec, ResourceSpec,
    ResourceType, ServiceSpec, UserSpec,
};
pub use types::{Action, ApplyOutcome, CurrentState, NotifyTiming};
