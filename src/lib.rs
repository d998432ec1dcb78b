// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod graph;
pub mod logging;
pub mod types;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::engine::{BuildController, RunReport};
use crate::errors::{BuildgraphError, Result};
use crate::exec::{CommandAction, TokioExecutor, WorkerLeaseService};
use crate::graph::{PlanQuery, WorkGraphBuilder};
use crate::types::{FailurePolicy, TaskPath};

pub use crate::engine::{ControllerState, ExecutionFailure, ExecutionResult};
pub use crate::types::NodeId;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - work graph population, scheduling, filtering and finalization
/// - execution on the tokio blocking pool under a worker lease
/// - Ctrl-C handling
///
/// With `--dry-run` the finalized plan is printed and an empty report is
/// returned without running anything.
pub async fn run(args: CliArgs) -> Result<RunReport> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    let workers = args.workers.unwrap_or(cfg.config.workers);
    if workers == 0 {
        return Err(BuildgraphError::ConfigError(
            "--workers must be >= 1 (got 0)".to_string(),
        ));
    }
    let policy = if args.keep_going {
        FailurePolicy::Continue
    } else {
        cfg.config.failure_policy
    };

    let leases = Arc::new(WorkerLeaseService::new(workers));
    let mut controller = BuildController::new(leases).with_failure_policy(policy);

    let root_dir = config_root_dir(&config_path);
    controller.populate_work_graph(|graph| populate_from_config(graph, &cfg, &root_dir))?;

    let entries = if args.tasks.is_empty() {
        cfg.default_entry_points()
    } else {
        args.tasks.clone()
    };
    info!(?entries, "entry points for this build");
    for task in &entries {
        controller.queue_for_execution(task.as_str())?;
    }
    controller.schedule_queued_tasks()?;

    let disabled: HashSet<TaskPath> = cfg
        .task
        .iter()
        .filter(|(_, task)| !task.enabled)
        .map(|(name, _)| TaskPath::from(name.as_str()))
        .collect();
    if !disabled.is_empty() {
        debug!(disabled = disabled.len(), "filtering disabled tasks");
        controller.add_filter(move |node| !disabled.contains(node.path()))?;
    }

    let excluded = args.exclude.clone();
    controller.add_finalization(move |draft| {
        for name in &excluded {
            if !draft.exclude(name) {
                warn!(task = %name, "excluded task is not part of the plan");
            }
        }
        Ok(())
    })?;

    controller.finalize_work_graph()?;

    if args.dry_run {
        let leases = Arc::clone(controller.leases());
        leases.run_as_worker(|| -> Result<()> {
            if let Some(plan) = controller.plan_query() {
                print_dry_run(plan, workers, policy)?;
            }
            Ok(())
        })?;
        return Ok(RunReport::default());
    }

    let executor = TokioExecutor::current()?;
    let (tx, rx) = oneshot::channel();
    controller.start_execution(&executor, move |result| {
        // The receiver only disappears if `run` itself was dropped.
        let _ = tx.send(result);
    })?;

    // Ctrl-C → stop before the next task.
    let ctrl_c = {
        let stop = controller.stop_handle();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            warn!("Ctrl-C received; stopping after the current task");
            stop.request();
        })
    };

    let result = rx
        .await
        .map_err(|_| anyhow!("build run ended without reporting a result"))?;
    ctrl_c.abort();

    let report = result?;
    info!(%report, "build succeeded");
    Ok(report)
}

/// Define one graph task per `[task.<name>]` section.
fn populate_from_config(
    graph: &mut WorkGraphBuilder<'_>,
    cfg: &ConfigFile,
    root_dir: &Path,
) -> anyhow::Result<()> {
    for (name, task) in cfg.task.iter() {
        let mut def = graph
            .task(name.as_str())
            .depends_on_all(task.after.iter().map(String::as_str));

        if let Some(cmd) = &task.cmd {
            def = def.action(Arc::new(CommandAction::new(cmd.as_str()).in_dir(root_dir)));
        }
        if let Some(text) = &task.description {
            def.description(text.as_str());
        }
    }
    Ok(())
}

/// Directory task commands run in.
///
/// - If the config path has a non-empty parent (e.g. "ci/Buildgraph.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Buildgraph.toml" (parent = ""),
///   we fall back to the current working directory "."
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Dry-run output: the finalized plan in execution order.
///
/// Reads the plan through a worker-only query, so the caller must hold a
/// lease.
fn print_dry_run(plan: PlanQuery<'_>, workers: usize, policy: FailurePolicy) -> Result<()> {
    let steps = plan.steps()?;

    println!("buildgraph dry-run");
    println!("  config.workers = {workers}");
    println!("  config.failure_policy = {policy:?}");
    println!();

    println!("plan ({} tasks):", steps.len());
    for (position, step) in steps.iter().enumerate() {
        match step.skip_reason() {
            Some(reason) => println!("  {}. {} (skipped: {reason:?})", position + 1, step.path()),
            None => println!("  {}. {}", position + 1, step.path()),
        }
        if let Some(cmd) = step.action().and_then(|a| a.describe()) {
            println!("      cmd: {cmd}");
        }
        if let Some(text) = step.description() {
            println!("      description: {text}");
        }
        let deps: Vec<&str> = step
            .dependencies()
            .iter()
            .map(|&i| steps[i].path().as_str())
            .collect();
        if !deps.is_empty() {
            println!("      after: {deps:?}");
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
