//! Where tasks land for each kind of target.

use std::sync::Arc;

use parking_lot::Mutex;
use torc::{ArgSpec, Buffer, LocalCluster, Registry, RuntimeError, Target, WorkId};

use crate::common::run_cluster;

fn whereami_registry() -> (Registry, WorkId) {
    let mut registry = Registry::new();
    let whereami = registry.register_task("whereami", |ctx, args| {
        args.set(0, ctx.node_id() as i32);
        args.set(1, ctx.level() as i32);
    });
    (registry, whereami)
}

fn placed(
    root: &torc::TaskContext<'_>,
    whereami: WorkId,
    targets: &[Target],
    direct: bool,
) -> torc::RuntimeResult<Vec<(i32, i32)>> {
    let outs: Vec<(Buffer, Buffer)> = targets
        .iter()
        .map(|_| (Buffer::new::<i32>(1), Buffer::new::<i32>(1)))
        .collect();
    for (target, (node, level)) in targets.iter().zip(&outs) {
        let args = vec![ArgSpec::result(node), ArgSpec::result(level)];
        if direct {
            root.create_direct(*target, whereami, args)?;
        } else {
            root.create(*target, whereami, args)?;
        }
    }
    root.waitall();
    Ok(outs
        .iter()
        .map(|(node, level)| (node.get::<i32>(0), level.get::<i32>(0)))
        .collect())
}

#[test]
fn test_worker_and_node_targets() {
    let cluster = LocalCluster::new(2);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let out = seen.clone();

    run_cluster(&cluster, 2, whereami_registry, move |root, whereami| {
        let targets = [
            Target::Worker(0),
            Target::Worker(1),
            Target::Worker(2),
            Target::Worker(3),
            Target::WorkerFront(3),
            Target::Node(0),
            Target::Node(1),
            Target::NodeFront(1),
        ];
        *out.lock() = placed(root, whereami, &targets, false)?;
        Ok(())
    });

    let nodes: Vec<i32> = seen.lock().iter().map(|(node, _)| *node).collect();
    assert_eq!(nodes, vec![0, 0, 1, 1, 1, 0, 1, 1]);
    assert!(seen.lock().iter().all(|(_, level)| *level == 1));
}

#[test]
fn test_direct_task_runs_on_remote_server() {
    let cluster = LocalCluster::new(2);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let out = seen.clone();

    let reports = run_cluster(&cluster, 1, whereami_registry, move |root, whereami| {
        *out.lock() = placed(root, whereami, &[Target::Node(1), Target::Node(1)], true)?;
        Ok(())
    });

    assert_eq!(*seen.lock(), vec![(1, 1), (1, 1)]);
    assert_eq!(reports[0].stats.created, 2);
    assert_eq!(reports[1].stats.executed, 2);
    // the server slot is not one of node 1's worker slots
    assert_eq!(reports[1].stats.executed_per_worker, vec![0]);
}

#[test]
fn test_out_of_range_targets_are_rejected() {
    let cluster = LocalCluster::new(2);
    let errors = Arc::new(Mutex::new(Vec::new()));
    let out = errors.clone();

    run_cluster(&cluster, 2, whereami_registry, move |root, whereami| {
        let node = Buffer::new::<i32>(1);
        let level = Buffer::new::<i32>(1);
        for target in [Target::Worker(4), Target::Node(2), Target::NodeFront(7)] {
            let args = vec![ArgSpec::result(&node), ArgSpec::result(&level)];
            if let Err(err) = root.create(target, whereami, args) {
                out.lock().push(err);
            }
        }
        Ok(())
    });

    let errors = errors.lock();
    assert_eq!(errors.len(), 3);
    assert!(matches!(
        errors[0],
        RuntimeError::InvalidTarget { worker: 4, total: 4 }
    ));
    assert!(matches!(errors[1], RuntimeError::InvalidNode { node: 2, nodes: 2 }));
    assert!(matches!(errors[2], RuntimeError::InvalidNode { node: 7, nodes: 2 }));
}

#[test]
fn test_direct_task_sees_server_identity() {
    let cluster = LocalCluster::new(2);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let out = seen.clone();

    let build = || {
        let mut registry = Registry::new();
        let identity = registry.register_task("identity", |ctx, args| {
            args.write(
                0,
                &[
                    ctx.on_server() as i32,
                    ctx.local_worker_id() as i32,
                    ctx.worker_id() as i32,
                ],
            );
        });
        (registry, identity)
    };

    run_cluster(&cluster, 1, build, move |root, identity| {
        let direct = Buffer::new::<i32>(3);
        let queued = Buffer::new::<i32>(3);
        root.create_direct(Target::Node(1), identity, vec![ArgSpec::result(&direct)])?;
        root.create(Target::Node(1), identity, vec![ArgSpec::result(&queued)])?;
        root.waitall();
        *out.lock() = vec![direct.to_vec::<i32>(), queued.to_vec::<i32>()];
        Ok(())
    });

    let server_slot = torc::runtime::SERVER_SLOT as i32;
    assert_eq!(*seen.lock(), vec![vec![1, server_slot, 1], vec![0, 0, 1]]);
}
