//! End-to-end runs of the demo workloads on in-process clusters.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use torc::{ArgSpec, Buffer, LocalCluster, Registry, Target};

use crate::common::{run_cluster, total};

fn sqrt_registry() -> (Registry, torc::WorkId) {
    let mut registry = Registry::new();
    let taskf = registry.register_task("taskf", |_ctx, args| {
        let a = args.scalar::<i32>(0);
        args.set(1, (a as f64).sqrt());
    });
    (registry, taskf)
}

fn sqrt_on(cluster: LocalCluster) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let out = seen.clone();

    let reports = run_cluster(&cluster, 2, sqrt_registry, move |root, taskf| {
        let results: Vec<Buffer> = (0..10).map(|_| Buffer::new::<f64>(1)).collect();
        for (i, result) in results.iter().enumerate() {
            root.create(
                Target::Any,
                taskf,
                vec![ArgSpec::value(i as i32), ArgSpec::result(result)],
            )?;
        }
        root.waitall();
        *out.lock() = results.iter().map(|r| r.get::<f64>(0)).collect();
        Ok(())
    });

    let values = seen.lock().clone();
    assert_eq!(values.len(), 10);
    for (i, value) in values.iter().enumerate() {
        assert_eq!(*value, (i as f64).sqrt(), "sqrt({})", i);
    }
    assert_eq!(reports[0].stats.created, 10);
    assert_eq!(total(&reports, |r| r.stats.executed), 10);
}

#[test]
fn test_sqrt_results_single_node() {
    sqrt_on(LocalCluster::new(1));
}

#[test]
fn test_sqrt_results_across_two_nodes() {
    sqrt_on(LocalCluster::new(2));
}

#[test]
fn test_sqrt_results_thread_unsafe_transport() {
    sqrt_on(LocalCluster::thread_unsafe(2));
}

#[test]
fn test_idle_node_steals_work() {
    const TASKS: usize = 16;
    let cluster = LocalCluster::new(2);
    let owners = Arc::new(Mutex::new(Vec::new()));
    let out = owners.clone();

    let build = || {
        let mut registry = Registry::new();
        let busy = registry.register_task("busy", |ctx, args| {
            thread::sleep(Duration::from_millis(20));
            args.set(0, ctx.node_id() as i32);
        });
        (registry, busy)
    };

    let reports = run_cluster(&cluster, 1, build, move |root, busy| {
        let results: Vec<Buffer> = (0..TASKS).map(|_| Buffer::new::<i32>(1)).collect();
        for result in &results {
            root.create(Target::Node(0), busy, vec![ArgSpec::result(result)])?;
        }
        root.enable_stealing()?;
        root.waitall();
        *out.lock() = results.iter().map(|r| r.get::<i32>(0)).collect();
        Ok(())
    });

    let owners = owners.lock().clone();
    assert_eq!(owners.len(), TASKS);
    let stolen = owners.iter().filter(|&&node| node == 1).count();
    assert!(stolen > 0, "no task ran on node 1: {:?}", owners);
    assert_eq!(owners.iter().filter(|&&node| node == 0).count() + stolen, TASKS);

    assert!(reports[1].stats.steal_hits > 0);
    assert_eq!(reports[1].stats.steal_hits, reports[0].stats.steal_served);
    assert_eq!(reports[0].stats.created, TASKS as u64);
    assert_eq!(total(&reports, |r| r.stats.executed), TASKS as u64);
}

#[test]
fn test_detached_tasks_do_not_block_waitall() {
    let cluster = LocalCluster::new(2);
    let runs = Arc::new(AtomicUsize::new(0));
    let pending_after_create = Arc::new(Mutex::new(None));

    let counter = runs.clone();
    let build = move || {
        let mut registry = Registry::new();
        let counter = counter.clone();
        let tick = registry.register_task("tick", move |_ctx, args| {
            assert!(args.is_empty());
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (registry, tick)
    };

    let pending = pending_after_create.clone();
    let reports = run_cluster(&cluster, 2, build, move |root, tick| {
        for _ in 0..4 {
            root.create_detached(Target::Any, tick, Vec::new())?;
        }
        *pending.lock() = Some(root.pending());
        root.waitall();
        Ok(())
    });

    assert_eq!(*pending_after_create.lock(), Some(0));
    assert_eq!(runs.load(Ordering::SeqCst), 4);
    // detached tasks count as executed but never as created
    assert_eq!(total(&reports, |r| r.stats.created), 0);
    assert_eq!(total(&reports, |r| r.stats.executed), 4);
}

#[test]
fn test_broadcast_reaches_every_node() {
    const NODES: usize = 3;
    let cluster = LocalCluster::new(NODES);
    let observed = Arc::new(Mutex::new(Vec::new()));
    let out = observed.clone();

    let build = || {
        let mut registry = Registry::new();
        let table = registry.register_broadcast("table", Buffer::from_slice(&[100i32; 16]));
        let peek = registry.register_task("peek", move |ctx, args| {
            let seen = ctx
                .node()
                .registry()
                .broadcast_target(table)
                .map(|b| b.to_vec::<i32>())
                .unwrap_or_default();
            args.write(0, &seen);
            args.set(1, ctx.node_id() as i32);
        });
        (registry, (table, peek))
    };

    run_cluster(&cluster, 1, build, move |root, (table, peek)| {
        let expected: Vec<i32> = (0..16).map(|i| 1000 + i).collect();
        if let Some(buffer) = root.node().registry().broadcast_target(table) {
            buffer.fill_from(&expected);
        }
        root.broadcast(table)?;

        let copies: Vec<(Buffer, Buffer)> = (0..NODES)
            .map(|_| (Buffer::new::<i32>(16), Buffer::new::<i32>(1)))
            .collect();
        for (node, (copy, where_ran)) in copies.iter().enumerate() {
            root.create(
                Target::Node(node),
                peek,
                vec![ArgSpec::result(copy), ArgSpec::result(where_ran)],
            )?;
        }
        root.waitall();

        *out.lock() = copies
            .iter()
            .map(|(copy, where_ran)| (where_ran.get::<i32>(0), copy.to_vec::<i32>()))
            .collect();
        Ok(())
    });

    let expected: Vec<i32> = (0..16).map(|i| 1000 + i).collect();
    let observed = observed.lock().clone();
    assert_eq!(observed.len(), NODES);
    for (node, (ran_on, seen)) in observed.iter().enumerate() {
        assert_eq!(*ran_on, node as i32);
        assert_eq!(seen, &expected, "node {}", node);
    }
}

#[test]
fn test_stolen_tasks_answer_their_home_node() {
    const TASKS: usize = 24;
    let cluster = LocalCluster::new(3);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let out = seen.clone();

    let build = || {
        let mut registry = Registry::new();
        let scale = registry.register_task("scale", |ctx, args| {
            thread::sleep(Duration::from_millis(10));
            let input = args.read::<i64>(0);
            args.write(1, &[input[0] * 2, input[1] * 2, ctx.node_id() as i64]);
        });
        (registry, scale)
    };

    // every task is homed on node 0 and shipped to node 1; node 0 steals
    // some back and node 2 takes others a second hop away from home
    let reports = run_cluster(&cluster, 1, build, move |root, scale| {
        let results: Vec<Buffer> = (0..TASKS).map(|_| Buffer::new::<i64>(3)).collect();
        for (i, result) in results.iter().enumerate() {
            let i = i as i64;
            root.create(
                Target::Node(1),
                scale,
                vec![ArgSpec::copy_slice(&[i, i + 100]), ArgSpec::result(result)],
            )?;
        }
        root.enable_stealing()?;
        root.waitall();
        *out.lock() = results.iter().map(|r| r.to_vec::<i64>()).collect();
        Ok(())
    });

    let seen = seen.lock().clone();
    assert_eq!(seen.len(), TASKS);
    for (i, values) in seen.iter().enumerate() {
        let i = i as i64;
        assert_eq!(&values[..2], &[2 * i, 2 * (i + 100)], "task {}", i);
        assert!((0..3).contains(&values[2]), "task {} ran on {}", i, values[2]);
    }

    assert!(reports[0].stats.steal_hits > 0, "node 0 stole nothing back");
    assert!(reports[2].stats.steal_hits > 0, "node 2 stole nothing");
    assert_eq!(
        reports[1].stats.steal_served,
        reports[0].stats.steal_hits + reports[2].stats.steal_hits
    );
    assert_eq!(reports[0].stats.created, TASKS as u64);
    assert_eq!(total(&reports, |r| r.stats.executed), TASKS as u64);
}
