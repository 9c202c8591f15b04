mod common;

use common::{Fault, Op, Scripted, chain, cloud, options, registry};
use reconciler::{
    AdapterError, AdapterRegistry, CancelHandle, ErrorCategory, Intent, NoProgress,
    ProgressCallback, ResourceDecl, ResourceId, ResourceKind, ResourceReport, ResourceStatus,
    RunError, SkipReason, StructuralError, Verb, plan, preview, run, run_plan, run_simple,
};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

#[test]
fn test_permanent_failure_contains_to_dependents() {
    let adapter = Scripted::new();
    adapter.fail(
        Op::Create,
        &cloud("db"),
        AdapterError::new(ErrorCategory::Validation, "invalid engine"),
    );

    let report = run_simple(chain(), Intent::Apply, &registry(&adapter), &options()).unwrap();

    assert_eq!(report.status_of(&cloud("net")), Some(ResourceStatus::Applied));
    assert_eq!(report.status_of(&cloud("db")), Some(ResourceStatus::Failed));
    assert_eq!(report.status_of(&cloud("app")), Some(ResourceStatus::Skipped));
    assert!(!report.overall_success);

    let db = report.get(&cloud("db")).unwrap();
    assert_eq!(db.attempts, 1);
    assert_eq!(db.error.as_ref().unwrap().category, ErrorCategory::Validation);

    let app = report.get(&cloud("app")).unwrap();
    assert_eq!(
        app.skip_reason,
        Some(SkipReason::UpstreamFailed {
            cause: cloud("db"),
            via: cloud("db"),
        })
    );
    // app's adapter is never touched, not even for a read
    assert_eq!(adapter.count(Op::Read, &cloud("app")), 0);
    assert_eq!(adapter.count(Op::Create, &cloud("app")), 0);
}

#[test]
fn test_skip_propagates_transitively_and_spares_other_branches() {
    let adapter = Scripted::new();
    adapter.fail(
        Op::Create,
        &cloud("net"),
        AdapterError::new(ErrorCategory::Unauthorized, "denied"),
    );
    let mut decls = chain();
    decls.push(ResourceDecl::new(ResourceKind::CloudObject, "dns", json!({"zone": "example.com"})));

    let report = run_simple(decls, Intent::Apply, &registry(&adapter), &options()).unwrap();

    assert_eq!(report.status_of(&cloud("dns")), Some(ResourceStatus::Applied));
    let app = report.get(&cloud("app")).unwrap();
    assert_eq!(
        app.skip_reason,
        Some(SkipReason::UpstreamFailed {
            cause: cloud("net"),
            via: cloud("db"),
        })
    );
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.skipped, 2);
    assert_eq!(report.summary.created, 1);
}

#[test]
fn test_transient_failures_retry_within_ceiling() {
    let adapter = Scripted::new();
    let a = cloud("a");
    let b = cloud("b");
    adapter.fail_times(
        Op::Create,
        &a,
        &AdapterError::new(ErrorCategory::RateLimited, "throttled"),
        2,
    );
    let decls = vec![
        ResourceDecl::new(ResourceKind::CloudObject, "a", json!({})),
        ResourceDecl::new(ResourceKind::CloudObject, "b", json!({})),
    ];

    let report = run_simple(decls, Intent::Apply, &registry(&adapter), &options()).unwrap();

    let a_entry = report.get(&a).unwrap();
    let b_entry = report.get(&b).unwrap();
    assert_eq!(a_entry.status, ResourceStatus::Applied);
    assert_eq!(a_entry.attempts, 3);
    assert_eq!(b_entry.status, ResourceStatus::Applied);
    assert_eq!(b_entry.attempts, 1);
    assert_eq!(a_entry.level, b_entry.level);
    assert_eq!(adapter.count(Op::Create, &a), 3);
    assert!(report.overall_success);
}

#[test]
fn test_transient_failures_past_ceiling_fail() {
    let adapter = Scripted::new();
    adapter.fail_times(
        Op::Create,
        &cloud("net"),
        &AdapterError::new(ErrorCategory::Unavailable, "503"),
        3,
    );

    let report = run_simple(chain(), Intent::Apply, &registry(&adapter), &options()).unwrap();

    let net = report.get(&cloud("net")).unwrap();
    assert_eq!(net.status, ResourceStatus::Failed);
    assert_eq!(net.attempts, 3);
    assert_eq!(adapter.count(Op::Create, &cloud("net")), 3);
}

#[test]
fn test_transient_read_is_retried() {
    let adapter = Scripted::new();
    adapter.fail(
        Op::Read,
        &cloud("net"),
        AdapterError::new(ErrorCategory::Conflict, "busy"),
    );

    let report = run_simple(chain(), Intent::Apply, &registry(&adapter), &options()).unwrap();

    assert!(report.overall_success);
    assert_eq!(adapter.count(Op::Read, &cloud("net")), 2);
    assert_eq!(adapter.count(Op::Read, &cloud("db")), 1);
}

#[test]
fn test_second_apply_is_all_noop() {
    let adapter = Scripted::new();
    let adapters = registry(&adapter);

    let first = run_simple(chain(), Intent::Apply, &adapters, &options()).unwrap();
    assert_eq!(first.summary.created, 3);

    adapter.clear_calls();
    let second = run_simple(chain(), Intent::Apply, &adapters, &options()).unwrap();

    assert!(second.entries.iter().all(|e| e.verb == Some(Verb::NoOp)));
    assert!(second.entries.iter().all(ResourceReport::is_unchanged));
    assert_eq!(second.summary.unchanged, 3);
    assert_eq!(adapter.mutations(), 0);
}

#[test]
fn test_drift_is_updated() {
    let adapter = Scripted::new();
    adapter.insert(&cloud("net"), json!({"cidr": "10.1.0.0/16"}));
    // Server-assigned fields are not drift
    adapter.insert(
        &cloud("db"),
        json!({"engine": "postgres", "arn": "arn:db", "created_at": "2026-01-01"}),
    );

    let report = run_simple(chain(), Intent::Apply, &registry(&adapter), &options()).unwrap();

    assert_eq!(report.get(&cloud("net")).unwrap().verb, Some(Verb::Update));
    assert_eq!(report.get(&cloud("db")).unwrap().verb, Some(Verb::NoOp));
    assert_eq!(report.get(&cloud("app")).unwrap().verb, Some(Verb::Create));
    assert_eq!(adapter.object(&cloud("net")), Some(json!({"cidr": "10.0.0.0/16"})));
    assert_eq!(report.summary.updated, 1);
}

#[test]
fn test_destroy_runs_in_reverse_order() {
    let adapter = Scripted::new();
    let adapters = registry(&adapter);
    run_simple(chain(), Intent::Apply, &adapters, &options()).unwrap();
    adapter.clear_calls();

    let report = run_simple(chain(), Intent::Destroy, &adapters, &options()).unwrap();

    assert_eq!(adapter.order_of(Op::Delete), ["app", "db", "net"]);
    assert_eq!(report.summary.deleted, 3);
    assert!(adapter.object(&cloud("net")).is_none());
    // Report entries stay in declaration order
    let names: Vec<_> = report.entries.iter().map(|e| e.id.name.as_str()).collect();
    assert_eq!(names, ["net", "db", "app"]);
    assert_eq!(report.get(&cloud("app")).unwrap().level, 0);
}

#[test]
fn test_destroy_of_absent_resources_is_noop() {
    let adapter = Scripted::new();
    let report = run_simple(chain(), Intent::Destroy, &registry(&adapter), &options()).unwrap();

    assert!(report.entries.iter().all(|e| e.verb == Some(Verb::NoOp)));
    assert_eq!(adapter.mutations(), 0);
}

#[test]
fn test_destroy_keeps_what_a_failed_dependent_still_uses() {
    let adapter = Scripted::new();
    let adapters = registry(&adapter);
    run_simple(chain(), Intent::Apply, &adapters, &options()).unwrap();
    adapter.fail(
        Op::Delete,
        &cloud("app"),
        AdapterError::new(ErrorCategory::Validation, "deletion protection"),
    );

    let report = run_simple(chain(), Intent::Destroy, &adapters, &options()).unwrap();

    assert_eq!(report.status_of(&cloud("app")), Some(ResourceStatus::Failed));
    assert_eq!(report.status_of(&cloud("db")), Some(ResourceStatus::Skipped));
    assert_eq!(report.status_of(&cloud("net")), Some(ResourceStatus::Skipped));
    assert!(adapter.object(&cloud("db")).is_some());
    assert_eq!(adapter.count(Op::Delete, &cloud("net")), 0);
}

#[test]
fn test_cycle_makes_no_adapter_calls() {
    let adapter = Scripted::new();
    let decls = vec![
        ResourceDecl::new(ResourceKind::CloudObject, "a", json!({})).depends_on(cloud("b")),
        ResourceDecl::new(ResourceKind::CloudObject, "b", json!({})).depends_on(cloud("a")),
    ];

    assert!(matches!(
        plan(decls.clone(), Intent::Apply),
        Err(StructuralError::CyclicDependency { .. })
    ));
    let err = run_simple(decls, Intent::Apply, &registry(&adapter), &options()).unwrap_err();

    assert!(matches!(
        err,
        RunError::Structural(StructuralError::CyclicDependency { .. })
    ));
    assert!(adapter.calls().is_empty());
}

#[test]
fn test_unknown_dependency_is_structural() {
    let adapter = Scripted::new();
    let decls = vec![
        ResourceDecl::new(ResourceKind::Container, "web", json!({}))
            .depends_on(ResourceId::new(ResourceKind::Image, "base")),
    ];

    let err = run_simple(decls, Intent::Apply, &registry(&adapter), &options()).unwrap_err();
    assert!(matches!(
        err,
        RunError::Structural(StructuralError::UnknownDependency { .. })
    ));
    assert!(adapter.calls().is_empty());
}

#[test]
fn test_missing_adapter_rejected_up_front() {
    let adapter = Scripted::new();
    let mut adapters = AdapterRegistry::new();
    adapters.register(ResourceKind::CloudObject, adapter.clone());
    let mut decls = chain();
    decls.push(ResourceDecl::new(ResourceKind::Container, "web", json!({"image": "web:1"})));

    let err = run_simple(decls, Intent::Apply, &adapters, &options()).unwrap_err();

    assert!(matches!(
        err,
        RunError::MissingAdapter {
            kind: ResourceKind::Container,
            ..
        }
    ));
    assert!(adapter.calls().is_empty());
}

#[test]
fn test_action_timeout_is_transient() {
    let adapter = Scripted::new();
    adapter.script(Op::Create, &cloud("net"), Fault::Sleep(Duration::from_millis(500)));
    let mut opts = options();
    opts.action_timeout = Some(Duration::from_millis(50));
    opts.retry.max_attempts = 1;

    let report = run_simple(chain(), Intent::Apply, &registry(&adapter), &opts).unwrap();

    let net = report.get(&cloud("net")).unwrap();
    assert_eq!(net.status, ResourceStatus::Failed);
    let err = net.error.as_ref().unwrap();
    assert_eq!(err.category, ErrorCategory::Timeout);
    assert!(err.transient);
    assert_eq!(report.status_of(&cloud("db")), Some(ResourceStatus::Skipped));
}

#[test]
fn test_timed_out_call_is_retried() {
    let adapter = Scripted::new();
    adapter.script(Op::Create, &cloud("net"), Fault::Sleep(Duration::from_millis(500)));
    let mut opts = options();
    opts.action_timeout = Some(Duration::from_millis(50));

    let report = run_simple(chain(), Intent::Apply, &registry(&adapter), &opts).unwrap();

    assert_eq!(report.get(&cloud("net")).unwrap().attempts, 2);
    assert!(report.overall_success);
}

#[test]
fn test_cancelled_before_start_skips_everything() {
    let adapter = Scripted::new();
    let opts = options();
    opts.cancel.cancel();

    let report = run_simple(chain(), Intent::Apply, &registry(&adapter), &opts).unwrap();

    assert!(
        report
            .entries
            .iter()
            .all(|e| e.skip_reason == Some(SkipReason::Cancelled))
    );
    assert!(report.overall_success);
    assert!(adapter.calls().is_empty());
}

/// Cancels the run once the given level has finished
struct CancelAfter {
    level: usize,
    handle: CancelHandle,
}

impl ProgressCallback for CancelAfter {
    fn on_level_complete(&self, level: usize) {
        if level == self.level {
            self.handle.cancel();
        }
    }
}

#[test]
fn test_cancel_stops_at_level_boundary() {
    let adapter = Scripted::new();
    let opts = options();
    let progress = CancelAfter {
        level: 0,
        handle: opts.cancel.clone(),
    };

    let report = run(chain(), Intent::Apply, &registry(&adapter), &opts, &progress).unwrap();

    assert_eq!(report.status_of(&cloud("net")), Some(ResourceStatus::Applied));
    for name in ["db", "app"] {
        let entry = report.get(&cloud(name)).unwrap();
        assert_eq!(entry.skip_reason, Some(SkipReason::Cancelled));
    }
    assert_eq!(adapter.count(Op::Read, &cloud("db")), 0);
}

#[test]
fn test_dry_run_reads_but_never_mutates() {
    let adapter = Scripted::new();
    adapter.insert(&cloud("net"), json!({"cidr": "10.0.0.0/16"}));
    let mut opts = options();
    opts.dry_run = true;

    let report = run_simple(chain(), Intent::Apply, &registry(&adapter), &opts).unwrap();

    assert!(report.dry_run);
    assert_eq!(adapter.mutations(), 0);
    assert_eq!(adapter.calls().len(), 3);
    let verbs: Vec<_> = report.entries.iter().map(|e| e.verb).collect();
    assert_eq!(verbs, [Some(Verb::NoOp), Some(Verb::Create), Some(Verb::Create)]);
    assert!(
        report
            .entries
            .iter()
            .all(|e| e.skip_reason == Some(SkipReason::DryRun))
    );
}

#[test]
fn test_target_limits_run_to_dependencies() {
    let adapter = Scripted::new();
    let mut opts = options();
    opts.targets = vec!["cloud-object/db".into()];

    let report = run_simple(chain(), Intent::Apply, &registry(&adapter), &opts).unwrap();

    let names: Vec<_> = report.entries.iter().map(|e| e.id.name.as_str()).collect();
    assert_eq!(names, ["net", "db"]);
    assert!(report.get(&cloud("app")).is_none());
    assert_eq!(adapter.count(Op::Read, &cloud("app")), 0);
}

#[test]
fn test_unknown_target_is_structural() {
    let adapter = Scripted::new();
    let mut opts = options();
    opts.targets = vec!["container/ghost".into()];

    let err = run_simple(chain(), Intent::Apply, &registry(&adapter), &opts).unwrap_err();
    assert!(matches!(
        err,
        RunError::Structural(StructuralError::UnknownTarget { .. })
    ));
}

#[test]
fn test_levels_are_barriers() {
    let adapter = Scripted::new();
    adapter.script(Op::Create, &cloud("net"), Fault::Sleep(Duration::from_millis(50)));
    let decls = vec![
        ResourceDecl::new(ResourceKind::CloudObject, "net", json!({})),
        ResourceDecl::new(ResourceKind::CloudObject, "dns", json!({})),
        ResourceDecl::new(ResourceKind::CloudObject, "db", json!({})).depends_on(cloud("net")),
    ];

    run_simple(decls, Intent::Apply, &registry(&adapter), &options()).unwrap();

    let events = adapter.events();
    let end_net = events.iter().position(|e| e == "end net").unwrap();
    let end_dns = events.iter().position(|e| e == "end dns").unwrap();
    let start_db = events.iter().position(|e| e == "start db").unwrap();
    assert!(end_net < start_db);
    assert!(end_dns < start_db);
}

#[test]
fn test_parallelism_is_bounded_by_jobs() {
    let adapter = Scripted::new();
    let decls: Vec<_> = (0..6)
        .map(|i| {
            let decl = ResourceDecl::new(ResourceKind::CloudObject, format!("bucket-{i}"), json!({}));
            adapter.script(Op::Create, &decl.id, Fault::Sleep(Duration::from_millis(20)));
            decl
        })
        .collect();
    let mut opts = options();
    opts.jobs = 2;

    let report = run_simple(decls, Intent::Apply, &registry(&adapter), &opts).unwrap();

    assert_eq!(report.summary.created, 6);
    assert!(adapter.max_in_flight() <= 2);
}

/// Records retry notifications
#[derive(Default)]
struct Retries(Mutex<Vec<(String, u32, u32)>>);

impl ProgressCallback for Retries {
    fn on_retry(
        &self,
        id: &ResourceId,
        attempt: u32,
        max_attempts: u32,
        _error: &AdapterError,
        _delay: Duration,
    ) {
        self.0
            .lock()
            .unwrap()
            .push((id.name.clone(), attempt, max_attempts));
    }
}

#[test]
fn test_retries_are_reported_to_progress() {
    let adapter = Scripted::new();
    adapter.fail_times(
        Op::Update,
        &cloud("net"),
        &AdapterError::new(ErrorCategory::Conflict, "locked"),
        2,
    );
    adapter.insert(&cloud("net"), json!({"cidr": "old"}));
    let progress = Retries::default();

    let report = run(chain(), Intent::Apply, &registry(&adapter), &options(), &progress).unwrap();

    assert!(report.overall_success);
    let retries = progress.0.lock().unwrap().clone();
    assert_eq!(
        retries,
        vec![("net".to_string(), 1, 3), ("net".to_string(), 2, 3)]
    );
}

#[test]
fn test_report_round_trips_through_json() {
    let adapter = Scripted::new();
    let report = run(
        chain(),
        Intent::Apply,
        &registry(&adapter),
        &options(),
        &NoProgress,
    )
    .unwrap();

    let text = serde_json::to_string_pretty(&report).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["intent"], "apply");
    assert_eq!(value["overall_success"], true);
    assert_eq!(value["entries"][2]["provider_id"], "p-app");
    assert!(report.finished_at >= report.started_at);
}

#[test]
fn test_preview_then_run_reads_each_resource_once_per_pass() {
    let adapter = Scripted::new();
    let adapters = registry(&adapter);
    let planned = plan(chain(), Intent::Apply).unwrap();
    let ids = [cloud("net"), cloud("db"), cloud("app")];

    let shown = preview(&planned, &adapters, &options()).unwrap();
    assert_eq!(shown.summary.creates, 3);
    assert_eq!(adapter.mutations(), 0);
    for id in &ids {
        assert_eq!(adapter.count(Op::Read, id), 1, "{id}");
    }

    // Appears between the preview and the run
    adapter.insert(&cloud("net"), json!({"cidr": "10.0.0.0/16"}));
    let report = run_plan(planned, &adapters, &options(), &NoProgress).unwrap();

    for id in &ids {
        assert_eq!(adapter.count(Op::Read, id), 2, "{id}");
    }
    assert_eq!(report.get(&cloud("net")).unwrap().verb, Some(Verb::NoOp));
    assert_eq!(report.summary.created, 2);
}

const NODES: usize = 4;

/// Edges `(node, dependency)` selected by `mask`, one bit per pair `dep < node`
fn dag_edges(mask: u32) -> Vec<(usize, usize)> {
    let mut edges = Vec::new();
    let mut bit = 0;
    for node in 1..NODES {
        for dep in 0..node {
            if mask & (1 << bit) != 0 {
                edges.push((node, dep));
            }
            bit += 1;
        }
    }
    edges
}

fn node(i: usize) -> ResourceId {
    cloud(&format!("n{i}"))
}

fn level_map(levels: &[Vec<ResourceId>]) -> HashMap<ResourceId, usize> {
    levels
        .iter()
        .enumerate()
        .flat_map(|(level, ids)| ids.iter().map(move |id| (id.clone(), level)))
        .collect()
}

#[test]
fn test_every_four_node_dag_levels_consistently() {
    for mask in 0..(1u32 << 6) {
        let edges = dag_edges(mask);
        let deps_of = |i: usize| -> Vec<usize> {
            edges.iter().filter(|(n, _)| *n == i).map(|&(_, d)| d).collect()
        };

        for reversed in [false, true] {
            let mut decls: Vec<ResourceDecl> = (0..NODES)
                .map(|i| {
                    deps_of(i).into_iter().fold(
                        ResourceDecl::new(ResourceKind::CloudObject, format!("n{i}"), json!({})),
                        |decl, dep| decl.depends_on(node(dep)),
                    )
                })
                .collect();
            if reversed {
                decls.reverse();
            }

            let levels = plan(decls.clone(), Intent::Apply).unwrap().levels();
            let level = level_map(&levels);
            assert_eq!(level.len(), NODES, "mask {mask:06b}");

            for &(n, d) in &edges {
                assert!(level[&node(d)] < level[&node(n)], "mask {mask:06b}: n{d} before n{n}");
            }
            for i in 0..NODES {
                let expected = deps_of(i).iter().map(|&d| level[&node(d)] + 1).max().unwrap_or(0);
                assert_eq!(level[&node(i)], expected, "mask {mask:06b}: n{i}");
            }

            let roots: BTreeSet<ResourceId> = levels[0].iter().cloned().collect();
            let independent: BTreeSet<ResourceId> =
                (0..NODES).filter(|&i| deps_of(i).is_empty()).map(node).collect();
            assert_eq!(roots, independent, "mask {mask:06b}");

            let destroy = level_map(&plan(decls, Intent::Destroy).unwrap().levels());
            for &(n, d) in &edges {
                assert!(destroy[&node(n)] < destroy[&node(d)], "mask {mask:06b}: n{n} before n{d}");
            }
        }
    }
}
