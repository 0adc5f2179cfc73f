//! Implementation of the `cairn plan` command.
//!
//! Resolves the graph and shows, level by level, which nodes are already in
//! the store and which would run a builder. Nothing is executed.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use serde::Serialize;

use cairn_lib::util::hash::ContentAddress;

use super::{open_store, resolve};
use crate::PlanArgs;
use crate::output::{node_label, print_info, print_json, print_pending, print_stat, print_success};

#[derive(Debug, Serialize)]
struct PlannedNode {
  name: String,
  address: ContentAddress,
  level: usize,
  cached: bool,
}

#[derive(Debug, Serialize)]
struct PlanOutput {
  roots: Vec<ContentAddress>,
  to_build: usize,
  cached: usize,
  nodes: Vec<PlannedNode>,
}

pub fn cmd_plan(args: &PlanArgs, store: Option<&Path>) -> Result<ExitCode> {
  let store = open_store(store)?;
  let graph = resolve(&args.manifest, &args.roots, &store)?;

  let mut nodes = Vec::with_capacity(graph.len());
  for (level, addresses) in graph.levels().into_iter().enumerate() {
    for address in addresses {
      let Some(node) = graph.node(address) else {
        continue;
      };
      nodes.push(PlannedNode {
        name: node.name.clone(),
        address: address.clone(),
        level,
        cached: store.has(address),
      });
    }
  }

  let cached = nodes.iter().filter(|n| n.cached).count();
  let plan = PlanOutput {
    roots: graph.roots().to_vec(),
    to_build: nodes.len() - cached,
    cached,
    nodes,
  };

  if args.output.is_json() {
    print_json(&plan)?;
    return Ok(ExitCode::SUCCESS);
  }

  let mut current = None;
  for node in &plan.nodes {
    if current != Some(node.level) {
      print_info(&format!("Level {}", node.level));
      current = Some(node.level);
    }
    let label = format!("  {}", node_label(&node.name, node.address.as_str()));
    if node.cached {
      print_success(&format!("{} (cached)", label));
    } else {
      print_pending(&label);
    }
  }

  println!();
  print_stat("To build", &plan.to_build.to_string());
  print_stat("Cached", &plan.cached.to_string());

  Ok(ExitCode::SUCCESS)
}
