//! Implementation of the `cairn build` command.
//!
//! Resolves the manifest into an execution graph, runs every node not already
//! in the store and reports per-node results. Ctrl-C (or `--timeout`) cancels
//! in-flight builders; nothing they produced is sealed.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::warn;

use cairn_lib::execute::{BuildReport, ExecuteConfig, execute_until};
use cairn_lib::graph::ExecutionGraph;
use cairn_lib::store::ContentStore;
use cairn_lib::util::hash::ContentAddress;

use super::{open_store, resolve};
use crate::BuildArgs;
use crate::output::{
  format_duration, node_label, print_error, print_info, print_json, print_stat, print_success, print_warning,
  symbols,
};

/// Exit status when at least one node failed or was skipped.
const EXIT_FAILED: u8 = 1;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum NodeStatus {
  Built,
  Cached,
  Failed,
  Skipped,
}

#[derive(Debug, Serialize)]
struct NodeResult {
  name: String,
  address: ContentAddress,
  status: NodeStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  path: Option<PathBuf>,
  #[serde(skip_serializing_if = "Option::is_none")]
  log: Option<PathBuf>,
  #[serde(skip_serializing_if = "Option::is_none")]
  error: Option<String>,
  /// Name of the failed dependency that caused a skip.
  #[serde(skip_serializing_if = "Option::is_none")]
  failed_dependency: Option<String>,
}

#[derive(Debug, Serialize)]
struct BuildOutput {
  success: bool,
  duration_ms: u128,
  invocations: usize,
  roots: Vec<NodeResult>,
  nodes: Vec<NodeResult>,
}

pub fn cmd_build(args: &BuildArgs, store: Option<&Path>) -> Result<ExitCode> {
  let store = open_store(store)?;
  let graph = resolve(&args.manifest, &args.roots, &store)?;

  let mut config = ExecuteConfig {
    retries: args.retries,
    verify_cache: args.verify,
    ..ExecuteConfig::default()
  };
  if let Some(jobs) = args.jobs {
    config.parallelism = jobs;
  }

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let start = Instant::now();
  let report = rt
    .block_on(execute_until(&graph, &store, &config, interrupted(args.timeout)))
    .context("Build aborted")?;
  let elapsed = start.elapsed();

  let nodes: Vec<NodeResult> = graph
    .topological_order()
    .into_iter()
    .filter_map(|address| node_result(&graph, &report, &store, address))
    .collect();

  if args.output.is_json() {
    let roots = graph
      .roots()
      .iter()
      .filter_map(|address| node_result(&graph, &report, &store, address))
      .collect();
    print_json(&BuildOutput {
      success: report.is_success(),
      duration_ms: elapsed.as_millis(),
      invocations: report.invocations(),
      roots,
      nodes,
    })?;
  } else {
    print_text(&graph, &report, &nodes, elapsed);
  }

  Ok(if report.is_success() {
    ExitCode::SUCCESS
  } else {
    ExitCode::from(EXIT_FAILED)
  })
}

/// Completes on Ctrl-C, or once `timeout` has elapsed.
async fn interrupted(timeout: Option<Duration>) {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      warn!(error = %e, "failed to listen for ctrl-c");
      std::future::pending::<()>().await;
    }
  };

  match timeout {
    Some(limit) => {
      tokio::select! {
        _ = ctrl_c => {}
        _ = tokio::time::sleep(limit) => {
          warn!(timeout = %humantime::format_duration(limit), "build timed out");
        }
      }
    }
    None => ctrl_c.await,
  }
}

fn node_result(
  graph: &ExecutionGraph,
  report: &BuildReport,
  store: &ContentStore,
  address: &ContentAddress,
) -> Option<NodeResult> {
  let node = graph.node(address)?;
  let mut result = NodeResult {
    name: node.name.clone(),
    address: address.clone(),
    status: NodeStatus::Cached,
    path: None,
    log: None,
    error: None,
    failed_dependency: None,
  };

  if let Some(entry) = report.realized.get(address) {
    result.status = NodeStatus::Built;
    result.path = Some(entry.path.clone());
    result.log = entry.log.clone();
  } else if let Some(entry) = report.cached.get(address) {
    result.path = Some(entry.path.clone());
    result.log = entry.log.clone();
  } else if let Some(error) = report.failed.get(address) {
    result.status = NodeStatus::Failed;
    result.error = Some(error.to_string());
    let log = store.log_path(address);
    result.log = log.exists().then_some(log);
  } else if let Some(dependency) = report.skipped.get(address) {
    result.status = NodeStatus::Skipped;
    result.failed_dependency = Some(
      graph
        .node(dependency)
        .map(|n| n.name.clone())
        .unwrap_or_else(|| dependency.to_string()),
    );
  } else {
    return None;
  }

  Some(result)
}

fn print_text(graph: &ExecutionGraph, report: &BuildReport, nodes: &[NodeResult], elapsed: Duration) {
  for node in nodes {
    let label = node_label(&node.name, node.address.as_str());
    match node.status {
      NodeStatus::Built => print_success(&label),
      NodeStatus::Cached => print_info(&format!("{} (cached)", label)),
      NodeStatus::Failed => {
        print_error(node.error.as_deref().unwrap_or(&node.name));
      }
      NodeStatus::Skipped => print_warning(&format!(
        "{}: skipped, dependency {} failed",
        node.name,
        node.failed_dependency.as_deref().unwrap_or("?")
      )),
    }
  }

  println!();
  print_stat("Built", &report.realized.len().to_string());
  print_stat("Cached", &report.cached.len().to_string());
  if !report.failed.is_empty() {
    print_stat("Failed", &report.failed.len().to_string());
  }
  if !report.skipped.is_empty() {
    print_stat("Skipped", &report.skipped.len().to_string());
  }
  print_stat("Duration", &format_duration(elapsed));

  for root in graph.roots() {
    if let (Some(node), Some(entry)) = (graph.node(root), report.entry(root)) {
      println!("{} {} {}", node.name, symbols::ARROW, entry.path.display());
    }
  }
}
