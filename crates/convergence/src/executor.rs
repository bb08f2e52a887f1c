//! Convergence executor - the per-resource state machine
//!
//! Resources converge strictly in declaration order, one at a time. The
//! one interruption is an `immediately` notification, which runs its target
//! to completion before the walk resumes. `delayed` notifications queue up
//! and run once each after the main walk, in first-queued order.
//!
//! Guards are evaluated at the moment the executor reaches a resource,
//! never earlier: resources converged earlier in the same run may have
//! changed the state a guard inspects.

use crate::context::{GuardEvaluator, RunProgress};
use crate::error::{Error, Result};
use crate::graph::NotificationGraph;
use crate::provider::ProviderRegistry;
use crate::registry::ResourceRegistry;
use crate::report::{Outcome, RunReport};
use crate::resource::{GuardKind, ResourceDeclaration};
use crate::types::{Action, CurrentState, NotifyTiming};
use std::collections::HashSet;

/// Options for a run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Treat every resource as best-effort: log failures and keep going
    pub best_effort: bool,
}

/// What `plan` predicts for one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// A guard would keep the resource from running
    WouldSkip { reason: String },
    /// Desired state already holds
    UpToDate,
    /// Apply would run
    WouldChange { summary: Option<String> },
}

/// One line of `plan` output
#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub resource: crate::resource::ResourceId,
    pub action: Action,
    pub disposition: Disposition,
}

/// Why a resource is being converged right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Its turn in the declaration-order walk
    Walk,
    /// A notification targeted it
    Notified,
}

/// Per-resource progress through the run
#[derive(Debug, Clone)]
enum Status {
    Pending,
    Skipped(String),
    NoOp,
    Changed,
    Failed(String),
}

/// A delayed notification waiting for the end of the main walk
#[derive(Debug, Clone, Copy)]
struct Queued {
    idx: usize,
    action: Action,
}

/// Mutable run state, created at run start and discarded at run end
///
/// `Status::Changed` doubles as the per-resource dirty flag: a resource is
/// dirty exactly when some apply of it changed system state this run.
struct RunState<'r> {
    registry: &'r ResourceRegistry,
    graph: &'r NotificationGraph,
    statuses: Vec<Status>,
    delayed: Vec<Queued>,
    delayed_seen: HashSet<usize>,
    /// Resources whose immediate-notification cascade is in progress
    in_flight: Vec<usize>,
}

impl<'r> RunState<'r> {
    fn new(registry: &'r ResourceRegistry, graph: &'r NotificationGraph) -> Self {
        Self {
            registry,
            graph,
            statuses: vec![Status::Pending; registry.len()],
            delayed: Vec::new(),
            delayed_seen: HashSet::new(),
            in_flight: Vec::new(),
        }
    }

    fn noop(&mut self, idx: usize) {
        if matches!(self.statuses[idx], Status::Pending) {
            self.statuses[idx] = Status::NoOp;
        }
    }

    fn skip(&mut self, idx: usize, reason: String) {
        if matches!(self.statuses[idx], Status::Pending) {
            self.statuses[idx] = Status::Skipped(reason);
        }
    }

    fn changed(&mut self, idx: usize) {
        if !matches!(self.statuses[idx], Status::Failed(_)) {
            self.statuses[idx] = Status::Changed;
        }
    }

    fn failed(&mut self, idx: usize, error: String) {
        self.statuses[idx] = Status::Failed(error);
    }
}

/// Walks the registry and converges each resource through its provider
pub struct Executor<'a> {
    providers: &'a ProviderRegistry,
    guards: &'a dyn GuardEvaluator,
}

impl<'a> Executor<'a> {
    pub fn new(providers: &'a ProviderRegistry, guards: &'a dyn GuardEvaluator) -> Self {
        Self { providers, guards }
    }

    /// Converge every registered resource and report per-resource outcomes
    ///
    /// Fails early only on manifest-level problems (notification edges
    /// naming unregistered resources); per-resource failures land in the
    /// report and, unless the resource is best-effort, halt the rest of
    /// the run.
    pub fn run(
        &self,
        registry: &ResourceRegistry,
        graph: &NotificationGraph,
        opts: &RunOptions,
        progress: &mut dyn RunProgress,
    ) -> Result<RunReport> {
        graph.validate(registry)?;

        let mut state = RunState::new(registry, graph);
        let mut halted = false;

        for idx in 0..registry.len() {
            let Some(decl) = registry.get(idx) else {
                break;
            };
            if !self.converge(&mut state, idx, decl.action, Origin::Walk, opts, progress) {
                halted = true;
                break;
            }
        }

        // Queued delayed notifications, first-queued order. A halted run
        // skips them: queued side effects are part of the remainder.
        if !halted {
            let mut next = 0;
            while next < state.delayed.len() {
                let queued = state.delayed[next];
                next += 1;
                if !self.converge(
                    &mut state,
                    queued.idx,
                    queued.action,
                    Origin::Notified,
                    opts,
                    progress,
                ) {
                    break;
                }
            }
        }

        let mut report = RunReport::new();
        for (idx, status) in state.statuses.iter().enumerate() {
            let Some(decl) = registry.get(idx) else {
                continue;
            };
            let outcome = match status {
                Status::Pending => Outcome::NotRun,
                Status::Skipped(reason) => Outcome::Skipped {
                    reason: reason.clone(),
                },
                Status::NoOp => Outcome::Unchanged,
                Status::Changed => Outcome::Updated,
                Status::Failed(error) => Outcome::Failed {
                    error: error.clone(),
                },
            };
            report.push(decl.id(), outcome);
        }
        Ok(report)
    }

    /// Guard + check every resource without applying anything
    pub fn plan(&self, registry: &ResourceRegistry) -> Result<Vec<PlanEntry>> {
        let mut entries = Vec::with_capacity(registry.len());
        for decl in registry.iter() {
            let id = decl.id();
            let disposition = if decl.action == Action::Nothing {
                Disposition::WouldSkip {
                    reason: "runs only when notified".into(),
                }
            } else if let Some(reason) = self
                .eval_guards(decl)
                .map_err(|e| Error::guard_evaluation(id.clone(), e))?
            {
                Disposition::WouldSkip { reason }
            } else {
                let provider = self.providers.resolve(decl.rtype())?;
                match provider
                    .check(decl, decl.action)
                    .map_err(|e| Error::provider_check(id.clone(), e))?
                {
                    CurrentState::Converged => Disposition::UpToDate,
                    CurrentState::Divergent { summary } => Disposition::WouldChange { summary },
                }
            };
            entries.push(PlanEntry {
                resource: id,
                action: decl.action,
                disposition,
            });
        }
        Ok(entries)
    }

    /// Converge one resource; returns false when the run must halt
    fn converge(
        &self,
        state: &mut RunState,
        idx: usize,
        action: Action,
        origin: Origin,
        opts: &RunOptions,
        progress: &mut dyn RunProgress,
    ) -> bool {
        let registry = state.registry;
        let Some(decl) = registry.get(idx) else {
            return true;
        };
        let id = decl.id();

        // `nothing` resources sit out the main walk entirely
        if origin == Origin::Walk && decl.action == Action::Nothing {
            log::debug!("{id} declares action nothing; waiting for notifications");
            state.noop(idx);
            return true;
        }

        progress.on_resource_start(&id, action);

        // A notified `nothing` resource runs unconditionally: the trigger
        // itself asked for the action. Everything else honors its guards.
        let bypass_guards = origin == Origin::Notified && decl.action == Action::Nothing;
        if !bypass_guards {
            match self.eval_guards(decl) {
                Ok(None) => {}
                Ok(Some(reason)) => {
                    log::info!("{id} skipped: {reason}");
                    state.skip(idx, reason.clone());
                    progress.on_resource_complete(&id, &Outcome::Skipped { reason });
                    return true;
                }
                Err(e) => {
                    return self.fail(
                        state,
                        idx,
                        Error::guard_evaluation(id.clone(), e),
                        opts,
                        progress,
                    );
                }
            }
        }

        let provider = match self.providers.resolve(decl.rtype()) {
            Ok(provider) => provider,
            Err(e) => return self.fail(state, idx, e, opts, progress),
        };

        match provider.check(decl, action) {
            Ok(CurrentState::Converged) => {
                log::debug!("{id} already converged");
                state.noop(idx);
                progress.on_resource_complete(&id, &Outcome::Unchanged);
                return true;
            }
            Ok(CurrentState::Divergent { summary }) => {
                if let Some(summary) = summary {
                    log::debug!("{id} divergent: {summary}");
                }
            }
            Err(e) => {
                return self.fail(
                    state,
                    idx,
                    Error::provider_check(id.clone(), e),
                    opts,
                    progress,
                );
            }
        }

        log::info!("converging {id} ({action})");
        match provider.apply(decl, action) {
            Err(e) => self.fail(
                state,
                idx,
                Error::provider_apply(id.clone(), e),
                opts,
                progress,
            ),
            Ok(outcome) if outcome.is_change() => {
                state.changed(idx);
                progress.on_resource_complete(&id, &Outcome::Updated);
                self.fire_notifications(state, idx, opts, progress)
            }
            Ok(_) => {
                state.noop(idx);
                progress.on_resource_complete(&id, &Outcome::Unchanged);
                true
            }
        }
    }

    /// Run immediate notifications and queue delayed ones for a freshly
    /// updated resource; returns false when the run must halt
    fn fire_notifications(
        &self,
        state: &mut RunState,
        idx: usize,
        opts: &RunOptions,
        progress: &mut dyn RunProgress,
    ) -> bool {
        let registry = state.registry;
        let graph = state.graph;
        let Some(decl) = registry.get(idx) else {
            return true;
        };
        let id = decl.id();

        for notification in graph.notifications_for(&id) {
            let Some(target_idx) = registry.position(&notification.target) else {
                // validated up front; an unknown target cannot reach here
                continue;
            };
            match notification.timing {
                NotifyTiming::Delayed => {
                    // dedup by target identity; the first-seen action wins
                    if state.delayed_seen.insert(target_idx) {
                        log::debug!("{id} queues delayed {} for {}", notification.action, notification.target);
                        state.delayed.push(Queued {
                            idx: target_idx,
                            action: notification.action,
                        });
                    } else {
                        log::debug!("{} already queued; keeping its first action", notification.target);
                    }
                }
                NotifyTiming::Immediately => {
                    if state.in_flight.contains(&target_idx) {
                        let err = Error::NotificationCycle {
                            resource: notification.target.clone(),
                        };
                        return self.fail(state, idx, err, opts, progress);
                    }
                    log::debug!("{id} notifies {} immediately", notification.target);
                    state.in_flight.push(idx);
                    let keep_going = self.converge(
                        state,
                        target_idx,
                        notification.action,
                        Origin::Notified,
                        opts,
                        progress,
                    );
                    state.in_flight.pop();
                    if !keep_going {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Evaluate guards in declaration order; Some(reason) means skip
    fn eval_guards(&self, decl: &ResourceDeclaration) -> anyhow::Result<Option<String>> {
        for guard in &decl.guards {
            let value = self.guards.evaluate(&guard.check)?;
            let (skip, reason) = match guard.kind {
                GuardKind::OnlyIf => (!value, format!("only_if {} is false", guard.check)),
                GuardKind::NotIf => (value, format!("not_if {} is true", guard.check)),
            };
            if skip {
                return Ok(Some(reason));
            }
        }
        Ok(None)
    }

    /// Record a resource failure; returns false when the run must halt
    fn fail(
        &self,
        state: &mut RunState,
        idx: usize,
        err: Error,
        opts: &RunOptions,
        progress: &mut dyn RunProgress,
    ) -> bool {
        let Some(decl) = state.registry.get(idx) else {
            return false;
        };
        let id = decl.id();
        let error = err.to_string();
        log::error!("{error}");
        state.failed(idx, error.clone());
        progress.on_resource_complete(&id, &Outcome::Failed { error });

        if decl.best_effort || opts.best_effort {
            log::warn!("continuing past failure of {id} (best effort)");
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoProgress;
    use crate::provider::Provider;
    use crate::resource::{Guard, GuardCheck, ResourceId};
    use crate::spec::{
        DirectorySpec, ExecuteSpec, FileSpec, PackageSpec, ResourceSpec, ResourceType, ServiceSpec,
        UserSpec,
    };
    use crate::types::ApplyOutcome;
    use anyhow::bail;
    use std::collections::{BTreeMap, HashMap};
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    /// Shared fake host: which resources hold their desired state, and the
    /// order applies happened in
    #[derive(Debug, Default)]
    struct Host {
        converged: HashSet<String>,
        applied: Vec<String>,
    }

    /// Provider whose world is the fake host above
    struct FakeProvider {
        host: Arc<Mutex<Host>>,
        fail_apply: HashSet<String>,
        fail_check: HashSet<String>,
        /// Names that re-run on every visit (one-shot semantics)
        always_divergent: HashSet<String>,
    }

    impl FakeProvider {
        fn new(host: Arc<Mutex<Host>>) -> Self {
            Self {
                host,
                fail_apply: HashSet::new(),
                fail_check: HashSet::new(),
                always_divergent: HashSet::new(),
            }
        }

        fn failing_apply(mut self, name: &str) -> Self {
            self.fail_apply.insert(name.into());
            self
        }

        fn failing_check(mut self, name: &str) -> Self {
            self.fail_check.insert(name.into());
            self
        }

        fn one_shot(mut self, name: &str) -> Self {
            self.always_divergent.insert(name.into());
            self
        }
    }

    impl Provider for FakeProvider {
        fn check(&self, decl: &ResourceDeclaration, _action: Action) -> anyhow::Result<CurrentState> {
            if self.fail_check.contains(&decl.name) {
                bail!("cannot probe {}", decl.name);
            }
            let host = self.host.lock().unwrap();
            if !self.always_divergent.contains(&decl.name) && host.converged.contains(&decl.name) {
                Ok(CurrentState::Converged)
            } else {
                Ok(CurrentState::divergent())
            }
        }

        fn apply(&self, decl: &ResourceDeclaration, _action: Action) -> anyhow::Result<ApplyOutcome> {
            if self.fail_apply.contains(&decl.name) {
                bail!("boom applying {}", decl.name);
            }
            let mut host = self.host.lock().unwrap();
            host.applied.push(decl.name.clone());
            if host.converged.insert(decl.name.clone()) {
                Ok(ApplyOutcome::Created)
            } else {
                Ok(ApplyOutcome::Executed)
            }
        }
    }

    /// Guard evaluator answering from a fixed table; unknown checks are false
    #[derive(Default)]
    struct TableGuards {
        truths: HashMap<String, bool>,
    }

    impl TableGuards {
        fn with(mut self, key: &str, value: bool) -> Self {
            self.truths.insert(key.into(), value);
            self
        }
    }

    impl GuardEvaluator for TableGuards {
        fn evaluate(&self, check: &GuardCheck) -> anyhow::Result<bool> {
            let key = match check {
                GuardCheck::Command { command, .. } => command.clone(),
                GuardCheck::FileExists { path } => path.display().to_string(),
            };
            Ok(self.truths.get(&key).copied().unwrap_or(false))
        }
    }

    /// Guard evaluator whose predicates always blow up
    struct BrokenGuards;

    impl GuardEvaluator for BrokenGuards {
        fn evaluate(&self, _check: &GuardCheck) -> anyhow::Result<bool> {
            bail!("guard shell is missing")
        }
    }

    fn providers_for(host: &Arc<Mutex<Host>>) -> ProviderRegistry {
        providers_with(FakeProvider::new(Arc::clone(host)))
    }

    fn providers_with(provider: FakeProvider) -> ProviderRegistry {
        let provider = Arc::new(provider);
        let mut registry = ProviderRegistry::new();
        for rtype in [
            ResourceType::Package,
            ResourceType::User,
            ResourceType::Group,
            ResourceType::Directory,
            ResourceType::File,
            ResourceType::Link,
            ResourceType::Git,
            ResourceType::Service,
            ResourceType::Execute,
        ] {
            registry.register(rtype, Box::new(SharedProvider(Arc::clone(&provider))));
        }
        registry
    }

    /// Lets one FakeProvider serve every resource type
    struct SharedProvider(Arc<FakeProvider>);

    impl Provider for SharedProvider {
        fn check(&self, decl: &ResourceDeclaration, action: Action) -> anyhow::Result<CurrentState> {
            self.0.check(decl, action)
        }

        fn apply(&self, decl: &ResourceDeclaration, action: Action) -> anyhow::Result<ApplyOutcome> {
            self.0.apply(decl, action)
        }
    }

    fn package(name: &str) -> ResourceDeclaration {
        ResourceDeclaration::new(name, ResourceSpec::Package(PackageSpec::default()))
    }

    fn execute(name: &str) -> ResourceDeclaration {
        ResourceDeclaration::new(
            name,
            ResourceSpec::Execute(ExecuteSpec {
                command: format!("run {name}"),
                cwd: None,
                user: None,
                environment: BTreeMap::new(),
            }),
        )
    }

    fn registry_of(decls: Vec<ResourceDeclaration>) -> ResourceRegistry {
        let mut registry = ResourceRegistry::new();
        for decl in decls {
            registry.register(decl).unwrap();
        }
        registry
    }

    fn run(
        providers: &ProviderRegistry,
        guards: &dyn GuardEvaluator,
        registry: &ResourceRegistry,
        graph: &NotificationGraph,
    ) -> RunReport {
        Executor::new(providers, guards)
            .run(registry, graph, &RunOptions::default(), &mut NoProgress)
            .unwrap()
    }

    #[test]
    fn second_run_converges_to_all_noop() {
        let host = Arc::new(Mutex::new(Host::default()));
        let providers = providers_for(&host);
        let guards = TableGuards::default();
        let registry = registry_of(vec![package("nginx"), package("postgresql")]);
        let graph = NotificationGraph::new();

        let first = run(&providers, &guards, &registry, &graph);
        assert_eq!(first.updated(), 2);
        assert!(first.is_success());

        let second = run(&providers, &guards, &registry, &graph);
        assert_eq!(second.updated(), 0);
        assert_eq!(second.unchanged(), 2);
        assert!(second.is_success());
    }

    #[test]
    fn not_if_true_never_reaches_the_provider() {
        let host = Arc::new(Mutex::new(Host::default()));
        let providers = providers_for(&host);
        let guards = TableGuards::default().with("already done", true);
        let registry = registry_of(vec![package("nginx").with_guard(Guard::not_if(
            GuardCheck::Command {
                command: "already done".into(),
                cwd: None,
                user: None,
            },
        ))]);

        let report = run(&providers, &guards, &registry, &NotificationGraph::new());
        assert_eq!(report.skipped(), 1);
        assert!(host.lock().unwrap().applied.is_empty());
    }

    #[test]
    fn only_if_false_skips() {
        let host = Arc::new(Mutex::new(Host::default()));
        let providers = providers_for(&host);
        let guards = TableGuards::default(); // unknown checks are false
        let registry = registry_of(vec![package("nginx").with_guard(Guard::only_if(
            GuardCheck::FileExists {
                path: PathBuf::from("/etc/flag"),
            },
        ))]);

        let report = run(&providers, &guards, &registry, &NotificationGraph::new());
        assert_eq!(report.skipped(), 1);
        assert!(host.lock().unwrap().applied.is_empty());
    }

    #[test]
    fn immediate_notification_runs_target_before_later_resources() {
        // A notifies B immediately; C sits between them in declaration
        // order; B must run before C does.
        let host = Arc::new(Mutex::new(Host::default()));
        let providers = providers_for(&host);
        let guards = TableGuards::default();
        let registry = registry_of(vec![execute("a"), execute("c"), execute("b")]);
        let mut graph = NotificationGraph::new();
        graph
            .add(
                ResourceId::new(ResourceType::Execute, "a"),
                crate::graph::Notification {
                    target: ResourceId::new(ResourceType::Execute, "b"),
                    timing: NotifyTiming::Immediately,
                    action: Action::Run,
                },
            )
            .unwrap();

        let report = run(&providers, &guards, &registry, &graph);
        assert!(report.is_success());
        let applied = host.lock().unwrap().applied.clone();
        // b's own turn later in the walk finds it already converged
        assert_eq!(applied, ["a", "b", "c"]);
        assert_eq!(
            report.outcome_of(&ResourceId::new(ResourceType::Execute, "b")),
            Some(&Outcome::Updated)
        );
    }

    #[test]
    fn delayed_notifications_dedup_and_run_after_the_walk() {
        // three updated resources all notify the same nothing-action
        // target with delayed timing; it runs exactly once, at the end
        let host = Arc::new(Mutex::new(Host::default()));
        let providers = providers_for(&host);
        let guards = TableGuards::default();
        let registry = registry_of(vec![
            execute("one"),
            execute("two"),
            execute("three"),
            execute("handler").with_action(Action::Nothing),
        ]);
        let mut graph = NotificationGraph::new();
        let handler = ResourceId::new(ResourceType::Execute, "handler");
        for source in ["one", "two", "three"] {
            graph
                .add(
                    ResourceId::new(ResourceType::Execute, source),
                    crate::graph::Notification {
                        target: handler.clone(),
                        timing: NotifyTiming::Delayed,
                        action: Action::Run,
                    },
                )
                .unwrap();
        }

        let report = run(&providers, &guards, &registry, &graph);
        assert!(report.is_success());
        let applied = host.lock().unwrap().applied.clone();
        assert_eq!(applied, ["one", "two", "three", "handler"]);
        assert_eq!(report.outcome_of(&handler), Some(&Outcome::Updated));
    }

    #[test]
    fn delayed_notified_nothing_resource_bypasses_its_guards() {
        let host = Arc::new(Mutex::new(Host::default()));
        let providers = providers_for(&host);
        // guard would skip the handler if it were consulted
        let guards = TableGuards::default().with("handler done", true);
        let registry = registry_of(vec![
            execute("setup"),
            execute("handler")
                .with_action(Action::Nothing)
                .with_guard(Guard::not_if(GuardCheck::Command {
                    command: "handler done".into(),
                    cwd: None,
                    user: None,
                })),
        ]);
        let mut graph = NotificationGraph::new();
        graph
            .add(
                ResourceId::new(ResourceType::Execute, "setup"),
                crate::graph::Notification {
                    target: ResourceId::new(ResourceType::Execute, "handler"),
                    timing: NotifyTiming::Delayed,
                    action: Action::Run,
                },
            )
            .unwrap();

        let report = run(&providers, &guards, &registry, &graph);
        assert!(report.is_success());
        assert_eq!(host.lock().unwrap().applied, ["setup", "handler"]);
    }

    #[test]
    fn nothing_resource_sits_out_an_unnotified_walk() {
        let host = Arc::new(Mutex::new(Host::default()));
        let providers = providers_for(&host);
        let guards = TableGuards::default();
        let registry = registry_of(vec![execute("handler").with_action(Action::Nothing)]);

        let report = run(&providers, &guards, &registry, &NotificationGraph::new());
        assert_eq!(report.unchanged(), 1);
        assert!(host.lock().unwrap().applied.is_empty());
    }

    #[test]
    fn first_seen_action_wins_for_delayed_dedup() {
        let host = Arc::new(Mutex::new(Host::default()));
        let captured: Arc<Mutex<Vec<Action>>> = Arc::new(Mutex::new(Vec::new()));

        /// Records the action each apply was invoked with
        struct ActionRecorder {
            inner: FakeProvider,
            actions: Arc<Mutex<Vec<Action>>>,
        }

        impl Provider for ActionRecorder {
            fn check(
                &self,
                decl: &ResourceDeclaration,
                action: Action,
            ) -> anyhow::Result<CurrentState> {
                self.inner.check(decl, action)
            }

            fn apply(
                &self,
                decl: &ResourceDeclaration,
                action: Action,
            ) -> anyhow::Result<ApplyOutcome> {
                if decl.name == "svc" {
                    self.actions.lock().unwrap().push(action);
                }
                self.inner.apply(decl, action)
            }
        }

        let mut providers = ProviderRegistry::new();
        for rtype in [ResourceType::Execute, ResourceType::Service] {
            providers.register(
                rtype,
                Box::new(ActionRecorder {
                    inner: FakeProvider::new(Arc::clone(&host)),
                    actions: Arc::clone(&captured),
                }),
            );
        }

        let guards = TableGuards::default();
        let registry = registry_of(vec![
            execute("writes-config"),
            execute("writes-certs"),
            ResourceDeclaration::new("svc", ResourceSpec::Service(ServiceSpec::default()))
                .with_action(Action::Nothing),
        ]);
        let svc = ResourceId::new(ResourceType::Service, "svc");
        let mut graph = NotificationGraph::new();
        graph
            .add(
                ResourceId::new(ResourceType::Execute, "writes-config"),
                crate::graph::Notification {
                    target: svc.clone(),
                    timing: NotifyTiming::Delayed,
                    action: Action::Reload,
                },
            )
            .unwrap();
        graph
            .add(
                ResourceId::new(ResourceType::Execute, "writes-certs"),
                crate::graph::Notification {
                    target: svc,
                    timing: NotifyTiming::Delayed,
                    action: Action::Restart,
                },
            )
            .unwrap();

        let report = run(&providers, &guards, &registry, &graph);
        assert!(report.is_success());
        assert_eq!(*captured.lock().unwrap(), [Action::Reload]);
    }

    #[test]
    fn fail_fast_halts_the_remaining_walk() {
        let host = Arc::new(Mutex::new(Host::default()));
        let providers =
            providers_with(FakeProvider::new(Arc::clone(&host)).failing_apply("two"));
        let guards = TableGuards::default();
        let registry = registry_of(vec![
            execute("one"),
            execute("two"),
            execute("three"),
            execute("four"),
            execute("five"),
        ]);

        let report = run(&providers, &guards, &registry, &NotificationGraph::new());
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.updated(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.not_run(), 3);
        assert_eq!(host.lock().unwrap().applied, ["one"]);
    }

    #[test]
    fn best_effort_resource_logs_and_continues() {
        let host = Arc::new(Mutex::new(Host::default()));
        let providers =
            providers_with(FakeProvider::new(Arc::clone(&host)).failing_apply("two"));
        let guards = TableGuards::default();
        let registry = registry_of(vec![
            execute("one"),
            execute("two").best_effort(true),
            execute("three"),
        ]);

        let report = run(&providers, &guards, &registry, &NotificationGraph::new());
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.updated(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.not_run(), 0);
        assert_eq!(host.lock().unwrap().applied, ["one", "three"]);
    }

    #[test]
    fn global_best_effort_option_applies_to_every_resource() {
        let host = Arc::new(Mutex::new(Host::default()));
        let providers =
            providers_with(FakeProvider::new(Arc::clone(&host)).failing_apply("one"));
        let guards = TableGuards::default();
        let registry = registry_of(vec![execute("one"), execute("two")]);

        let report = Executor::new(&providers, &guards)
            .run(
                &registry,
                &NotificationGraph::new(),
                &RunOptions { best_effort: true },
                &mut NoProgress,
            )
            .unwrap();
        assert_eq!(report.failed(), 1);
        assert_eq!(report.updated(), 1);
    }

    #[test]
    fn check_failure_is_a_resource_failure() {
        let host = Arc::new(Mutex::new(Host::default()));
        let providers =
            providers_with(FakeProvider::new(Arc::clone(&host)).failing_check("one"));
        let guards = TableGuards::default();
        let registry = registry_of(vec![execute("one")]);

        let report = run(&providers, &guards, &registry, &NotificationGraph::new());
        assert_eq!(report.failed(), 1);
        let outcome = report
            .outcome_of(&ResourceId::new(ResourceType::Execute, "one"))
            .unwrap();
        match outcome {
            Outcome::Failed { error } => assert!(error.contains("state check failed")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn guard_error_fails_the_resource() {
        let host = Arc::new(Mutex::new(Host::default()));
        let providers = providers_for(&host);
        let registry = registry_of(vec![package("nginx").with_guard(Guard::only_if(
            GuardCheck::Command {
                command: "test -x /bin/true".into(),
                cwd: None,
                user: None,
            },
        ))]);

        let report = run(
            &providers,
            &BrokenGuards,
            &registry,
            &NotificationGraph::new(),
        );
        assert_eq!(report.failed(), 1);
        assert!(host.lock().unwrap().applied.is_empty());
    }

    #[test]
    fn unresolvable_type_fails_the_resource() {
        let providers = ProviderRegistry::new();
        let guards = TableGuards::default();
        let registry = registry_of(vec![package("nginx")]);

        let report = run(&providers, &guards, &registry, &NotificationGraph::new());
        assert_eq!(report.failed(), 1);
        let outcome = report
            .outcome_of(&ResourceId::new(ResourceType::Package, "nginx"))
            .unwrap();
        match outcome {
            Outcome::Failed { error } => assert!(error.contains("no provider registered")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn notification_edges_must_name_registered_resources() {
        let host = Arc::new(Mutex::new(Host::default()));
        let providers = providers_for(&host);
        let guards = TableGuards::default();
        let registry = registry_of(vec![execute("a")]);
        let mut graph = NotificationGraph::new();
        graph
            .add(
                ResourceId::new(ResourceType::Execute, "a"),
                crate::graph::Notification {
                    target: ResourceId::new(ResourceType::Execute, "ghost"),
                    timing: NotifyTiming::Immediately,
                    action: Action::Run,
                },
            )
            .unwrap();

        let err = Executor::new(&providers, &guards)
            .run(&registry, &graph, &RunOptions::default(), &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, Error::ResourceNotFound { .. }));
    }

    #[test]
    fn mutual_immediate_notifications_are_detected() {
        // a and b notify each other immediately and both stay one-shot,
        // so the cascade would never terminate
        let host = Arc::new(Mutex::new(Host::default()));
        let providers = providers_with(
            FakeProvider::new(Arc::clone(&host))
                .one_shot("a")
                .one_shot("b"),
        );
        let guards = TableGuards::default();
        let registry = registry_of(vec![execute("a"), execute("b")]);
        let a = ResourceId::new(ResourceType::Execute, "a");
        let b = ResourceId::new(ResourceType::Execute, "b");
        let mut graph = NotificationGraph::new();
        graph
            .add(
                a.clone(),
                crate::graph::Notification {
                    target: b.clone(),
                    timing: NotifyTiming::Immediately,
                    action: Action::Run,
                },
            )
            .unwrap();
        graph
            .add(
                b,
                crate::graph::Notification {
                    target: a,
                    timing: NotifyTiming::Immediately,
                    action: Action::Run,
                },
            )
            .unwrap();

        let report = run(&providers, &guards, &registry, &graph);
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.failed(), 1);
    }

    #[test]
    fn unchanged_resources_do_not_notify() {
        let host = Arc::new(Mutex::new(Host::default()));
        host.lock().unwrap().converged.insert("config".into());
        let providers = providers_for(&host);
        let guards = TableGuards::default();
        let registry = registry_of(vec![
            execute("config"),
            execute("handler").with_action(Action::Nothing),
        ]);
        let mut graph = NotificationGraph::new();
        graph
            .add(
                ResourceId::new(ResourceType::Execute, "config"),
                crate::graph::Notification {
                    target: ResourceId::new(ResourceType::Execute, "handler"),
                    timing: NotifyTiming::Delayed,
                    action: Action::Run,
                },
            )
            .unwrap();

        let report = run(&providers, &guards, &registry, &graph);
        assert!(report.is_success());
        assert!(host.lock().unwrap().applied.is_empty());
        assert_eq!(
            report.outcome_of(&ResourceId::new(ResourceType::Execute, "handler")),
            Some(&Outcome::Unchanged)
        );
    }

    #[test]
    fn guarded_package_scenario_reports_expected_outcomes() {
        // user + directory converge, the package is guarded off because
        // it is already installed; overall run succeeds
        let host = Arc::new(Mutex::new(Host::default()));
        let providers = providers_for(&host);
        let guards = TableGuards::default().with("/usr/sbin/nginx", true);
        let registry = registry_of(vec![
            ResourceDeclaration::new(
                "svc",
                ResourceSpec::User(UserSpec {
                    system: true,
                    ..UserSpec::default()
                }),
            ),
            ResourceDeclaration::new(
                "/opt/app",
                ResourceSpec::Directory(DirectorySpec {
                    owner: Some("svc".into()),
                    ..DirectorySpec::default()
                }),
            ),
            package("nginx").with_guard(Guard::not_if(GuardCheck::FileExists {
                path: PathBuf::from("/usr/sbin/nginx"),
            })),
        ]);

        let report = run(&providers, &guards, &registry, &NotificationGraph::new());
        assert_eq!(report.exit_code(), 0);
        assert_eq!(
            report.outcome_of(&ResourceId::new(ResourceType::User, "svc")),
            Some(&Outcome::Updated)
        );
        assert_eq!(
            report.outcome_of(&ResourceId::new(ResourceType::Directory, "/opt/app")),
            Some(&Outcome::Updated)
        );
        assert!(matches!(
            report.outcome_of(&ResourceId::new(ResourceType::Package, "nginx")),
            Some(Outcome::Skipped { .. })
        ));
    }

    #[test]
    fn plan_reports_dispositions_without_applying() {
        let host = Arc::new(Mutex::new(Host::default()));
        host.lock().unwrap().converged.insert("done".into());
        let providers = providers_for(&host);
        let guards = TableGuards::default().with("skip me", true);
        let registry = registry_of(vec![
            execute("done"),
            execute("pending"),
            execute("guarded").with_guard(Guard::not_if(GuardCheck::Command {
                command: "skip me".into(),
                cwd: None,
                user: None,
            })),
            ResourceDeclaration::new(
                "/etc/app.conf",
                ResourceSpec::File(FileSpec::default()),
            )
            .with_action(Action::Nothing),
        ]);

        let entries = Executor::new(&providers, &guards).plan(&registry).unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].disposition, Disposition::UpToDate);
        assert!(matches!(
            entries[1].disposition,
            Disposition::WouldChange { .. }
        ));
        assert!(matches!(entries[2].disposition, Disposition::WouldSkip { .. }));
        assert!(matches!(entries[3].disposition, Disposition::WouldSkip { .. }));
        assert!(host.lock().unwrap().applied.is_empty());
    }
}
