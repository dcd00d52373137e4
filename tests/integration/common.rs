//! Shared helpers: run one runtime per node of an in-process cluster.

use std::sync::Arc;

use torc::{
    LocalCluster, Registry, Runtime, RuntimeConfig, RuntimeResult, ShutdownReport, TaskContext,
    Transport,
};

/// Fast polling, no process exit.
pub fn test_config(workers: usize) -> RuntimeConfig {
    RuntimeConfig {
        workers,
        poll_interval_ms: 1,
        steal_backoff_ms: 5,
        exit_on_shutdown: false,
        stats: true,
        ..RuntimeConfig::default()
    }
}

/// Start every node of `cluster` with `workers` workers, run `main` on the
/// coordinator and return the per-node shutdown reports in node order.
///
/// `build` runs once per node and must register the same functions in the
/// same order everywhere; its second value is handed to `main`.
pub fn run_cluster<T, B, M>(
    cluster: &LocalCluster,
    workers: usize,
    build: B,
    main: M,
) -> Vec<ShutdownReport>
where
    T: 'static,
    B: Fn() -> (Registry, T) + Send + Sync + 'static,
    M: Fn(&TaskContext<'_>, T) -> RuntimeResult<()> + Send + Sync + 'static,
{
    let results = cluster.launch(move |transport: Arc<dyn Transport>| {
        let (registry, ids) = build();
        Runtime::run(test_config(workers), registry, transport, |root| {
            main(root, ids)
        })
    });

    results
        .into_iter()
        .enumerate()
        .map(|(node, result)| {
            result
                .unwrap_or_else(|_| panic!("node {} panicked", node))
                .unwrap_or_else(|err| panic!("node {} failed: {}", node, err))
                .unwrap_or_else(|| panic!("node {} was already running", node))
        })
        .collect()
}

/// Sum of a statistic over all nodes.
pub fn total(
    reports: &[ShutdownReport],
    f: impl Fn(&ShutdownReport) -> u64,
) -> u64 {
    reports.iter().map(f).sum()
}
