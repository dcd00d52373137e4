//! Nested task trees: children created inside tasks, results flowing back to
//! the parent on whatever node it runs.

use std::sync::Arc;

use parking_lot::Mutex;
use torc::{ArgSpec, ArgValue, Buffer, CallConv, Datatype, LocalCluster, Registry, Target, WorkId};

use crate::common::{run_cluster, total};

fn fib_registry() -> (Registry, WorkId) {
    let mut registry = Registry::new();
    let fib = registry.register_task("fib", |ctx, args| {
        let n = args.scalar::<i32>(0);
        if n < 2 {
            args.set(1, n);
            return;
        }
        let fib = ctx
            .node()
            .registry()
            .lookup("fib")
            .expect("fib is registered");
        let left = Buffer::new::<i32>(1);
        let right = Buffer::new::<i32>(1);
        ctx.create(
            Target::Any,
            fib,
            vec![ArgSpec::value(n - 1), ArgSpec::result(&left)],
        )
        .expect("create left child");
        ctx.create(
            Target::Any,
            fib,
            vec![ArgSpec::value(n - 2), ArgSpec::result(&right)],
        )
        .expect("create right child");
        ctx.waitall();
        args.set(1, left.get::<i32>(0) + right.get::<i32>(0));
    });
    (registry, fib)
}

fn fib_tasks(n: i32) -> u64 {
    if n < 2 {
        1
    } else {
        1 + fib_tasks(n - 1) + fib_tasks(n - 2)
    }
}

fn fib_on(cluster: LocalCluster) {
    const N: i32 = 8;
    let answer = Arc::new(Mutex::new(None));
    let out = answer.clone();

    let reports = run_cluster(&cluster, 2, fib_registry, move |root, fib| {
        let result = Buffer::new::<i32>(1);
        root.create(
            Target::Any,
            fib,
            vec![ArgSpec::value(N), ArgSpec::result(&result)],
        )?;
        root.waitall();
        *out.lock() = Some(result.get::<i32>(0));
        Ok(())
    });

    assert_eq!(*answer.lock(), Some(21));
    let created = total(&reports, |r| r.stats.created);
    let executed = total(&reports, |r| r.stats.executed);
    assert_eq!(created, fib_tasks(N));
    assert_eq!(created, executed);
}

#[test]
fn test_fib_tree_single_node() {
    fib_on(LocalCluster::new(1));
}

#[test]
fn test_fib_tree_across_nodes() {
    fib_on(LocalCluster::new(2));
}

#[test]
fn test_fib_tree_thread_unsafe_transport() {
    fib_on(LocalCluster::thread_unsafe(2));
}

#[test]
fn test_reference_argument_updated_remotely() {
    let cluster = LocalCluster::new(2);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let out = seen.clone();

    let build = || {
        let mut registry = Registry::new();
        let double = registry.register_task("double", |_ctx, args| {
            let values: Vec<i64> = args.read::<i64>(0).iter().map(|v| v * 2).collect();
            args.write(0, &values);
        });
        (registry, double)
    };

    run_cluster(&cluster, 1, build, move |root, double| {
        let buffers: Vec<Buffer> = (0..2)
            .map(|node| Buffer::from_slice(&[node as i64 + 1, 10, 100]))
            .collect();
        for (node, buffer) in buffers.iter().enumerate() {
            root.create(Target::Node(node), double, vec![ArgSpec::reference(buffer)])?;
        }
        root.waitall();
        *out.lock() = buffers.iter().map(|b| b.to_vec::<i64>()).collect();
        Ok(())
    });

    assert_eq!(
        *seen.lock(),
        vec![vec![2i64, 20, 200], vec![4i64, 20, 200]]
    );
}

#[test]
fn test_input_conventions_reach_remote_executor() {
    let cluster = LocalCluster::new(2);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let out = seen.clone();

    let build = || {
        let mut registry = Registry::new();
        let mix = registry.register_task("mix", |ctx, args| {
            let by_value = args.scalar::<i64>(0);
            let block: i64 = args.read::<i64>(1).iter().sum();
            let copied = args.scalar::<i64>(2);
            let addressed: i64 = args.read::<i64>(3).iter().sum();
            args.write(
                4,
                &[by_value, block, copied, addressed, ctx.node_id() as i64],
            );
        });
        (registry, mix)
    };

    run_cluster(&cluster, 1, build, move |root, mix| {
        let addressed = Buffer::from_slice(&[5i64, 6]);
        let results: Vec<Buffer> = (0..2).map(|_| Buffer::new::<i64>(5)).collect();
        for (node, result) in results.iter().enumerate() {
            let by_value = ArgSpec::new(
                1,
                Datatype::Long,
                CallConv::ByValue,
                ArgValue::Buffer(Buffer::from_slice(&[42i64])),
            );
            root.create(
                Target::Node(node),
                mix,
                vec![
                    by_value,
                    ArgSpec::copy_slice(&[1i64, 2, 3]),
                    ArgSpec::copy(7i64),
                    ArgSpec::address(&addressed),
                    ArgSpec::result(result),
                ],
            )?;
        }
        root.waitall();
        *out.lock() = results.iter().map(|r| r.to_vec::<i64>()).collect();
        Ok(())
    });

    assert_eq!(
        *seen.lock(),
        vec![vec![42i64, 6, 7, 11, 0], vec![42i64, 6, 7, 11, 1]]
    );
}
