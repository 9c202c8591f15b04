//! Run driver - executes a plan level by level
//!
//! Each level runs on a bounded rayon pool; `pool.install` returning is the
//! level barrier. Containment and cancellation are decided on the driver
//! thread between levels, so a level never starts while an earlier one
//! still has resources in flight.

use crate::cancel::CancelHandle;
use crate::context::{NoProgress, ProgressCallback};
use crate::diff::{DiffSummary, ResourceDiff};
use crate::error::{AdapterError, RunError, StructuralError};
use crate::executor::{ActionExecutor, ActionOutcome};
use crate::graph::{GraphBuilder, ResourceGraph};
use crate::provider::{AdapterRegistry, SharedAdapter};
use crate::reconcile::{Reconciler, blocked_by};
use crate::report::{ReportBuilder, ResourceReport, RunReport};
use crate::resource::{Resource, ResourceDecl, ResourceId};
use crate::retry::{GaveUp, RetryPolicy};
use crate::scheduler::ExecutionPlan;
use crate::types::{Intent, SkipReason, Verb};
use rayon::prelude::*;
use std::time::{Duration, Instant};

/// Options for a run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Maximum resources evaluated concurrently within a level
    pub jobs: usize,
    pub retry: RetryPolicy,
    /// Per adapter call; `None` waits indefinitely
    pub action_timeout: Option<Duration>,
    pub cancel: CancelHandle,
    /// Read and classify only; no create/update/delete calls
    pub dry_run: bool,
    /// `kind` or `kind/name` selectors; empty selects everything
    pub targets: Vec<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            jobs: 4,
            retry: RetryPolicy::default(),
            action_timeout: Some(Duration::from_secs(300)),
            cancel: CancelHandle::new(),
            dry_run: false,
            targets: Vec::new(),
        }
    }
}

/// A validated graph together with its execution order
#[derive(Debug, Clone)]
pub struct Plan {
    pub graph: ResourceGraph,
    pub execution: ExecutionPlan,
}

impl Plan {
    /// Validate declarations and order them, restricted to `targets`
    pub fn new(
        builder: GraphBuilder,
        intent: Intent,
        targets: &[String],
    ) -> Result<Self, StructuralError> {
        let graph = builder.build()?;
        let execution = ExecutionPlan::for_targets(&graph, intent, targets)?;
        log::debug!(
            "planned {} of {} resources in {} levels",
            execution.total_resources(),
            graph.len(),
            execution.levels().len()
        );
        Ok(Self { graph, execution })
    }

    pub fn intent(&self) -> Intent {
        self.execution.intent()
    }

    /// Levels as resource ids, in execution order
    pub fn levels(&self) -> Vec<Vec<ResourceId>> {
        self.execution.level_ids(&self.graph)
    }

    /// Planned resources in execution order, paired with their level
    pub fn ordered(&self) -> impl Iterator<Item = (usize, &Resource)> {
        self.execution
            .levels()
            .iter()
            .enumerate()
            .flat_map(move |(level, indices)| {
                indices
                    .iter()
                    .map(move |&idx| (level, self.graph.resource(idx)))
            })
    }
}

/// Dry validation: build the graph and schedule it without any adapter call
pub fn plan(
    resources: impl IntoIterator<Item = ResourceDecl>,
    intent: Intent,
) -> Result<Plan, StructuralError> {
    let mut builder = GraphBuilder::new();
    builder.extend(resources);
    Plan::new(builder, intent, &[])
}

/// Full execution of `resources` for `intent`
pub fn run(
    resources: impl IntoIterator<Item = ResourceDecl>,
    intent: Intent,
    adapters: &AdapterRegistry,
    options: &RunOptions,
    progress: &dyn ProgressCallback,
) -> Result<RunReport, RunError> {
    let mut builder = GraphBuilder::new();
    builder.extend(resources);
    let plan = Plan::new(builder, intent, &options.targets)?;
    run_plan(plan, adapters, options, progress)
}

/// Execute an already validated plan
///
/// `options.targets` is ignored here; selection happens when the plan is
/// built.
pub fn run_plan(
    plan: Plan,
    adapters: &AdapterRegistry,
    options: &RunOptions,
    progress: &dyn ProgressCallback,
) -> Result<RunReport, RunError> {
    let Plan {
        mut graph,
        execution,
    } = plan;
    let intent = execution.intent();

    check_adapters(&graph, &execution, adapters)?;
    let pool = worker_pool(options.jobs)?;
    let report = ReportBuilder::new(intent, options.dry_run);

    log::info!(
        "{intent}: {} resources in {} levels{}",
        execution.total_resources(),
        execution.levels().len(),
        if options.dry_run { " (dry run)" } else { "" }
    );

    let worker = Worker {
        intent,
        options,
        progress,
        report: &report,
    };

    for (level, indices) in execution.levels().iter().enumerate() {
        if options.cancel.is_cancelled() {
            log::warn!("run cancelled before level {level}; skipping remaining resources");
            for pending in &execution.levels()[level..] {
                for &idx in pending {
                    let resource = graph.resource_mut(idx);
                    resource.mark_skipped(SkipReason::Cancelled);
                    worker.finish(resource, execution.level_of(idx).unwrap_or(level));
                }
            }
            break;
        }

        progress.on_level_start(level, indices.len());
        log::debug!("level {level}: {} resource(s)", indices.len());

        let mut runnable = Vec::with_capacity(indices.len());
        for &idx in indices {
            if let Some(reason) = blocked_by(&graph, idx, intent) {
                log::info!("{}: skipped, {reason}", graph.resource(idx).id());
                let resource = graph.resource_mut(idx);
                resource.mark_skipped(reason);
                worker.finish(resource, level);
            } else {
                runnable.push(idx);
            }
        }

        let mut work: Vec<(&mut Resource, SharedAdapter)> = Vec::with_capacity(runnable.len());
        for resource in graph.resources_mut(&runnable) {
            let adapter = adapters
                .get(resource.kind())
                .cloned()
                .ok_or_else(|| missing(resource))?;
            work.push((resource, adapter));
        }

        pool.install(|| {
            work.into_par_iter()
                .for_each(|(resource, adapter)| worker.process(resource, &adapter, level));
        });

        progress.on_level_complete(level);
    }

    let report = report.finish();
    log::info!(
        "{intent} finished: {} created, {} updated, {} deleted, {} unchanged, {} failed, {} skipped",
        report.summary.created,
        report.summary.updated,
        report.summary.deleted,
        report.summary.unchanged,
        report.summary.failed,
        report.summary.skipped
    );
    Ok(report)
}

/// Run without progress reporting
pub fn run_simple(
    resources: impl IntoIterator<Item = ResourceDecl>,
    intent: Intent,
    adapters: &AdapterRegistry,
    options: &RunOptions,
) -> Result<RunReport, RunError> {
    run(resources, intent, adapters, options, &NoProgress)
}

/// What a run of `plan` would change
#[derive(Debug, Clone, Default)]
pub struct Preview {
    /// Pending changes in execution order; no-ops are left out
    pub diffs: Vec<ResourceDiff>,
    pub summary: DiffSummary,
    /// Resources whose observed state could not be read
    pub unreadable: Vec<(ResourceId, AdapterError)>,
}

/// Read every planned resource and report the changes a run would make
pub fn preview(
    plan: &Plan,
    adapters: &AdapterRegistry,
    options: &RunOptions,
) -> Result<Preview, RunError> {
    check_adapters(&plan.graph, &plan.execution, adapters)?;
    let pool = worker_pool(options.jobs)?;
    let intent = plan.intent();

    let mut targets = Vec::new();
    for (level, resource) in plan.ordered() {
        let adapter = adapters
            .get(resource.kind())
            .cloned()
            .ok_or_else(|| missing(resource))?;
        targets.push((level, resource, adapter));
    }

    let reconciler = Reconciler {
        intent,
        retry: &options.retry,
        timeout: options.action_timeout,
        cancel: &options.cancel,
        progress: &NoProgress,
    };

    let decisions: Vec<_> = pool.install(|| {
        targets
            .par_iter()
            .map(|(level, resource, adapter)| (*level, *resource, reconciler.evaluate(adapter, resource)))
            .collect()
    });

    let mut preview = Preview::default();
    for (level, resource, decision) in decisions {
        match decision {
            Ok(decision) if decision.verb.is_change() => preview.diffs.push(ResourceDiff {
                id: resource.id().clone(),
                group: resource.group.clone(),
                level,
                verb: decision.verb,
                desired: resource.spec().clone(),
                observed: decision.observed.map(|state| state.spec),
            }),
            Ok(_) => {}
            Err((gave_up, _)) => preview
                .unreadable
                .push((resource.id().clone(), gave_up.into_error())),
        }
    }
    preview.summary = DiffSummary::from_diffs(&preview.diffs);
    Ok(preview)
}

/// Per-run state shared by the workers of every level
struct Worker<'a> {
    intent: Intent,
    options: &'a RunOptions,
    progress: &'a dyn ProgressCallback,
    report: &'a ReportBuilder,
}

impl Worker<'_> {
    /// Evaluate and execute one resource; the caller owns it exclusively
    fn process(&self, resource: &mut Resource, adapter: &SharedAdapter, level: usize) {
        let started = Instant::now();

        if self.options.cancel.is_cancelled() {
            log::info!("{}: skipped, run cancelled", resource.id());
            resource.mark_skipped(SkipReason::Cancelled);
            self.finish(resource, level);
            return;
        }

        self.progress.on_resource_start(resource.id());
        resource.begin_evaluation();

        let reconciler = Reconciler {
            intent: self.intent,
            retry: &self.options.retry,
            timeout: self.options.action_timeout,
            cancel: &self.options.cancel,
            progress: self.progress,
        };

        match reconciler.evaluate(adapter, resource) {
            Err((GaveUp::Cancelled(_), attempts)) => {
                resource.record_attempts(attempts);
                resource.mark_skipped(SkipReason::Cancelled);
            }
            Err((gave_up, attempts)) => {
                log::warn!("{}: read failed: {}", resource.id(), gave_up.error());
                resource.record_attempts(attempts);
                resource.mark_failed(gave_up.into_error());
            }
            Ok(decision) => {
                resource.classify(decision.verb);
                resource.set_provider_id(decision.observed.and_then(|state| state.provider_id));
                self.progress.on_action(resource.id(), decision.verb);

                if self.options.dry_run {
                    resource.mark_skipped(SkipReason::DryRun);
                } else {
                    self.execute(resource, adapter, decision.verb);
                }
            }
        }

        resource.record_elapsed(started.elapsed());
        self.finish(resource, level);
    }

    fn execute(&self, resource: &mut Resource, adapter: &SharedAdapter, verb: Verb) {
        let executor = ActionExecutor {
            retry: &self.options.retry,
            timeout: self.options.action_timeout,
            cancel: &self.options.cancel,
            progress: self.progress,
        };
        let action = executor.execute(adapter, resource, verb);
        resource.record_attempts(action.attempts);

        match action.outcome {
            ActionOutcome::Succeeded { provider_id } => {
                resource.set_provider_id(provider_id);
                resource.mark_applied();
            }
            ActionOutcome::Failed(err) => {
                log::warn!("{}: {verb} failed: {err}", resource.id());
                resource.mark_failed(err);
            }
            ActionOutcome::Cancelled(_) => {
                log::info!("{}: {verb} cancelled while waiting to retry", resource.id());
                resource.mark_skipped(SkipReason::Cancelled);
            }
        }
    }

    fn finish(&self, resource: &Resource, level: usize) {
        let entry = ResourceReport::from_resource(resource, level);
        self.progress.on_resource_complete(&entry);
        self.report.record(entry);
    }
}

/// Every planned resource needs an adapter before anything is called
fn check_adapters(
    graph: &ResourceGraph,
    execution: &ExecutionPlan,
    adapters: &AdapterRegistry,
) -> Result<(), RunError> {
    for level in execution.levels() {
        for &idx in level {
            let resource = graph.resource(idx);
            if !adapters.contains(resource.kind()) {
                return Err(missing(resource));
            }
        }
    }
    Ok(())
}

fn missing(resource: &Resource) -> RunError {
    RunError::MissingAdapter {
        kind: resource.kind(),
        resource: resource.id().clone(),
    }
}

fn worker_pool(jobs: usize) -> Result<rayon::ThreadPool, RunError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .thread_name(|i| format!("converge-worker-{i}"))
        .build()
        .map_err(|e| RunError::WorkerPool(e.to_string()))
}
