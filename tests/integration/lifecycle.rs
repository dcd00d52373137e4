//! Startup and shutdown behaviour of `Runtime`.

use std::sync::Arc;

use torc::{
    ArgSpec, Buffer, LocalCluster, Registry, Runtime, RuntimeError, Target, Transport,
};

use crate::common::{run_cluster, test_config, total};

fn noop_registry() -> (Registry, torc::WorkId) {
    let mut registry = Registry::new();
    let noop = registry.register_task("noop", |_ctx, _args| {});
    (registry, noop)
}

#[test]
fn test_single_node_report() {
    let cluster = LocalCluster::new(1);
    let reports = run_cluster(&cluster, 3, noop_registry, |root, noop| {
        assert_eq!(root.num_nodes(), 1);
        assert_eq!(root.num_workers(), 3);
        for _ in 0..6 {
            root.create(Target::Any, noop, Vec::new())?;
        }
        root.waitall();
        Ok(())
    });

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.node, 0);
    assert_eq!(report.stats.created, 6);
    assert_eq!(report.stats.executed, 6);
    assert_eq!(report.stats.executed_per_worker.len(), 3);
    assert_eq!(report.stats.steal_attempts, 0);
    assert!(report.uptime_secs >= 0.0);
}

#[test]
fn test_run_on_attached_node_returns_none() {
    let cluster = LocalCluster::new(1);
    let transport = cluster.transport(0);
    transport.attach().expect("first attach");

    let (registry, _) = noop_registry();
    let transport: Arc<dyn Transport> = transport;
    let outcome = Runtime::run(test_config(1), registry, transport, |_root| {
        panic!("main must not run on an already running node")
    });
    assert!(matches!(outcome, Ok(None)));
}

#[test]
fn test_invalid_config_is_rejected() {
    let cluster = LocalCluster::new(1);
    let (registry, _) = noop_registry();
    let outcome = Runtime::run(test_config(0), registry, cluster.transport(0), |_root| Ok(()));
    assert!(matches!(outcome, Err(RuntimeError::Config(_))));
}

#[test]
fn test_report_serializes_to_json() {
    let cluster = LocalCluster::new(1);
    let reports = run_cluster(&cluster, 1, noop_registry, |root, noop| {
        root.create(Target::Any, noop, Vec::new())?;
        root.waitall();
        Ok(())
    });

    let json = reports[0].to_json().expect("report serializes");
    assert!(json.contains("\"steal_hits\":0"));
    assert!(json.contains("\"executed\":1"));
    assert!(json.contains("\"uptime_secs\""));
}

#[test]
fn test_reset_statistics_clears_every_node() {
    let cluster = LocalCluster::new(2);
    let build = || {
        let mut registry = Registry::new();
        let touch = registry.register_task("touch", |ctx, args| {
            args.set(0, ctx.node_id() as i32);
        });
        (registry, touch)
    };

    let reports = run_cluster(&cluster, 1, build, |root, touch| {
        let out = Buffer::new::<i32>(1);
        for _ in 0..4 {
            root.create(Target::Node(1), touch, vec![ArgSpec::result(&out)])?;
        }
        root.waitall();
        root.reset_statistics()?;

        for _ in 0..2 {
            root.create(Target::Node(1), touch, vec![ArgSpec::result(&out)])?;
        }
        root.waitall();
        Ok(())
    });

    assert_eq!(reports[0].stats.created, 2);
    assert_eq!(reports[1].stats.executed, 2);
    assert_eq!(total(&reports, |r| r.stats.executed), 2);
}
