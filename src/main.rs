//! torc - demo driver
//!
//! Runs the demo applications on an in-process cluster, one thread per node.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use torc::util::config::RuntimeConfig;
use torc::util::logger;
use torc::{ArgSpec, Buffer, LocalCluster, Registry, Runtime, Target, Transport, NAME, VERSION};

/// Task-parallel runtime demos
#[derive(Parser, Debug)]
#[command(name = "torc")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Number of in-process nodes
    #[arg(short, long, default_value_t = 2, global = true)]
    nodes: usize,

    /// Worker threads per node (overrides config file and environment)
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// RON configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Build the cluster as not thread safe (single transport lock, polling receives)
    #[arg(long, global = true)]
    thread_unsafe: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Compute square roots in child tasks and collect the results
    Sqrt {
        /// Number of tasks
        #[arg(default_value_t = 10)]
        count: usize,
    },

    /// Broadcast a buffer and print what every worker sees before and after
    Broadcast,

    /// Create every task on node 0 and let the other nodes steal
    Steal {
        /// Number of tasks
        #[arg(default_value_t = 64)]
        tasks: usize,

        /// Milliseconds each task sleeps
        #[arg(long, default_value_t = 20)]
        millis: u64,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.verbose {
        logger::init_debug();
    } else {
        logger::init();
    }

    if args.nodes == 0 {
        bail!("at least one node is required");
    }
    let mut config = RuntimeConfig::load(args.config.as_deref())?;
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    config.validate()?;

    let cluster = LocalCluster::with_thread_safety(args.nodes, !args.thread_unsafe);
    let command = args.command;
    let results = cluster.launch(move |transport| run_node(&command, config.clone(), transport));

    for (node, result) in results.into_iter().enumerate() {
        match result {
            Ok(outcome) => outcome.with_context(|| format!("node {} failed", node))?,
            Err(_) => bail!("node {} panicked", node),
        }
    }
    Ok(())
}

fn run_node(
    command: &Commands,
    config: RuntimeConfig,
    transport: Arc<dyn Transport>,
) -> Result<()> {
    match command {
        Commands::Sqrt { count } => sqrt_demo(*count, config, transport),
        Commands::Broadcast => broadcast_demo(config, transport),
        Commands::Steal { tasks, millis } => steal_demo(*tasks, *millis, config, transport),
    }
}

fn sqrt_demo(
    count: usize,
    config: RuntimeConfig,
    transport: Arc<dyn Transport>,
) -> Result<()> {
    let mut registry = Registry::new();
    let taskf = registry.register_task("taskf", |_ctx, args| {
        let a = args.scalar::<i32>(0);
        args.set(1, (a as f64).sqrt());
    });

    Runtime::run(config, registry, transport, move |root| {
        let results: Vec<Buffer> = (0..count).map(|_| Buffer::new::<f64>(1)).collect();
        for (i, result) in results.iter().enumerate() {
            root.create(
                Target::Any,
                taskf,
                vec![ArgSpec::value(i as i32), ArgSpec::result(result)],
            )?;
        }
        root.waitall();

        for (i, result) in results.iter().enumerate() {
            println!("sqrt({})={:.6}", i, result.get::<f64>(0));
        }
        Ok(())
    })?;
    Ok(())
}

fn broadcast_demo(
    config: RuntimeConfig,
    transport: Arc<dyn Transport>,
) -> Result<()> {
    let values = Buffer::from_slice(&[100i32; 16]);
    let mut registry = Registry::new();
    let shared = registry.register_broadcast("values", values.clone());
    let show = registry.register_task("show", move |ctx, _args| {
        let seen = ctx
            .node()
            .registry()
            .broadcast_target(shared)
            .map(|buffer| buffer.to_vec::<i32>())
            .unwrap_or_default();
        println!(
            "worker[{}] node[{}]: {:?}",
            ctx.worker_id(),
            ctx.node_id(),
            &seen[..seen.len().min(4)]
        );
    });

    Runtime::run(config, registry, transport, move |root| {
        let workers = root.num_workers();
        let updated: Vec<i32> = (0..16).map(|i| 1000 + i).collect();
        values.fill_from(&updated);

        for _ in 0..workers {
            root.create(Target::Any, show, Vec::new())?;
        }
        root.waitall();

        root.broadcast(shared)?;
        for _ in 0..workers {
            root.create(Target::Any, show, Vec::new())?;
        }
        root.waitall();
        Ok(())
    })?;
    Ok(())
}

fn steal_demo(
    tasks: usize,
    millis: u64,
    config: RuntimeConfig,
    transport: Arc<dyn Transport>,
) -> Result<()> {
    let mut registry = Registry::new();
    let busy = registry.register_task("busy", move |ctx, args| {
        thread::sleep(Duration::from_millis(millis));
        args.set(0, ctx.node_id() as i32);
    });

    Runtime::run(config, registry, transport, move |root| {
        let owners: Vec<Buffer> = (0..tasks).map(|_| Buffer::new::<i32>(1)).collect();
        for owner in &owners {
            root.create(Target::Node(0), busy, vec![ArgSpec::result(owner)])?;
        }
        root.enable_stealing()?;
        let t0 = root.gettime();
        root.waitall();
        let elapsed = root.gettime() - t0;

        let mut per_node = vec![0usize; root.num_nodes()];
        for owner in &owners {
            if let Some(count) = per_node.get_mut(owner.get::<i32>(0) as usize) {
                *count += 1;
            }
        }
        println!("tasks per node: {:?}", per_node);
        println!("elapsed time: {:.2} seconds", elapsed);
        Ok(())
    })?;
    Ok(())
}
