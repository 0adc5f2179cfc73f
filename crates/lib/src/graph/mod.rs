//! Dependency graph construction for a build request.
//!
//! [`ExecutionGraph::resolve`] walks the manifest depth-first from the
//! requested roots, resolves every input to either a content address or a
//! hashed local source, and computes each node's address from its normalized
//! description. All reference errors (cycles, unknown names, missing store
//! entries or sources) surface here, before anything is executed.
//!
//! Edges point from a dependency to its dependents, so the graph's sources
//! are the nodes that can start immediately.

mod types;

use std::collections::{BTreeMap, HashMap, HashSet};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use tracing::{debug, info};

use crate::description::{InputRef, ResolvedDescription, ResolvedInput};
use crate::manifest::Manifest;
use crate::store::ContentStore;
use crate::util::hash::{ContentAddress, hash_path};

pub use types::{GraphError, GraphNode};

/// Name used as the referrer when a requested root does not exist.
const REQUEST: &str = "build request";

/// The DAG of descriptions reachable from the roots of one build request.
#[derive(Debug)]
pub struct ExecutionGraph {
  graph: DiGraph<ContentAddress, ()>,
  indices: HashMap<ContentAddress, NodeIndex>,
  nodes: HashMap<ContentAddress, GraphNode>,
  roots: Vec<ContentAddress>,
}

impl ExecutionGraph {
  /// Resolve `roots` (description names) against `manifest`.
  ///
  /// `store` is consulted for `store` inputs, which must already be sealed.
  pub fn resolve(manifest: &Manifest, roots: &[&str], store: &ContentStore) -> Result<Self, GraphError> {
    let mut resolver = Resolver::new(manifest, store);

    let mut root_addresses = Vec::new();
    for root in roots {
      let address = resolver.visit(root)?;
      if !root_addresses.contains(&address) {
        root_addresses.push(address);
      }
    }

    let graph = Self {
      graph: resolver.graph,
      indices: resolver.indices,
      nodes: resolver.nodes,
      roots: root_addresses,
    };

    info!(nodes = graph.len(), roots = graph.roots.len(), "resolved execution graph");
    Ok(graph)
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn roots(&self) -> &[ContentAddress] {
    &self.roots
  }

  pub fn node(&self, address: &ContentAddress) -> Option<&GraphNode> {
    self.nodes.get(address)
  }

  /// Direct dependencies of `address`.
  pub fn dependencies(&self, address: &ContentAddress) -> Vec<&ContentAddress> {
    self.neighbors(address, Direction::Incoming)
  }

  /// Direct dependents of `address`.
  pub fn dependents(&self, address: &ContentAddress) -> Vec<&ContentAddress> {
    self.neighbors(address, Direction::Outgoing)
  }

  fn neighbors(&self, address: &ContentAddress, direction: Direction) -> Vec<&ContentAddress> {
    let Some(&idx) = self.indices.get(address) else {
      return Vec::new();
    };

    self
      .graph
      .neighbors_directed(idx, direction)
      .map(|n| &self.graph[n])
      .collect()
  }

  /// Every node that transitively depends on `address`, excluding itself.
  pub fn descendants(&self, address: &ContentAddress) -> Vec<&ContentAddress> {
    let Some(&start) = self.indices.get(address) else {
      return Vec::new();
    };

    let mut found = Vec::new();
    let mut bfs = Bfs::new(&self.graph, start);
    while let Some(idx) = bfs.next(&self.graph) {
      if idx != start {
        found.push(&self.graph[idx]);
      }
    }
    found
  }

  /// Nodes grouped into levels: every node's dependencies sit in earlier levels.
  ///
  /// Within a level nodes are ordered by name, then address.
  pub fn levels(&self) -> Vec<Vec<&ContentAddress>> {
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();
    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();
    let mut levels = Vec::new();

    while !remaining.is_empty() {
      let mut ready: Vec<NodeIndex> = remaining.iter().filter(|idx| in_degree[*idx] == 0).copied().collect();
      // Resolution never produces cycles, but don't spin if one sneaks in.
      if ready.is_empty() {
        break;
      }

      for idx in &ready {
        remaining.remove(idx);
        for dependent in self.graph.neighbors_directed(*idx, Direction::Outgoing) {
          if let Some(degree) = in_degree.get_mut(&dependent) {
            *degree = degree.saturating_sub(1);
          }
        }
      }

      ready.sort_by_key(|idx| {
        let address = &self.graph[*idx];
        (self.nodes[address].name.as_str(), address)
      });
      levels.push(ready.into_iter().map(|idx| &self.graph[idx]).collect());
    }

    levels
  }

  /// All nodes, dependencies before dependents.
  pub fn topological_order(&self) -> Vec<&ContentAddress> {
    self.levels().into_iter().flatten().collect()
  }
}

enum Mark {
  InProgress,
  Done(ContentAddress),
}

/// Depth-first traversal state for [`ExecutionGraph::resolve`].
struct Resolver<'a> {
  manifest: &'a Manifest,
  store: &'a ContentStore,
  marks: HashMap<String, Mark>,
  /// Names currently being resolved, outermost first.
  stack: Vec<String>,
  graph: DiGraph<ContentAddress, ()>,
  indices: HashMap<ContentAddress, NodeIndex>,
  nodes: HashMap<ContentAddress, GraphNode>,
}

impl<'a> Resolver<'a> {
  fn new(manifest: &'a Manifest, store: &'a ContentStore) -> Self {
    Self {
      manifest,
      store,
      marks: HashMap::new(),
      stack: Vec::new(),
      graph: DiGraph::new(),
      indices: HashMap::new(),
      nodes: HashMap::new(),
    }
  }

  fn visit(&mut self, name: &str) -> Result<ContentAddress, GraphError> {
    match self.marks.get(name) {
      Some(Mark::Done(address)) => return Ok(address.clone()),
      Some(Mark::InProgress) => {
        let start = self.stack.iter().position(|n| n == name).unwrap_or(0);
        let mut path = self.stack[start..].to_vec();
        path.push(name.to_string());
        return Err(GraphError::CyclicDependency { path });
      }
      None => {}
    }

    let manifest = self.manifest;
    let description = manifest.get(name).ok_or_else(|| GraphError::UnresolvedReference {
      from: self.stack.last().map(String::as_str).unwrap_or(REQUEST).to_string(),
      reference: format!("build '{}'", name),
    })?;
    description.validate()?;

    self.marks.insert(name.to_string(), Mark::InProgress);
    self.stack.push(name.to_string());

    let mut inputs = BTreeMap::new();
    let mut sources = BTreeMap::new();
    let mut dependencies = Vec::new();

    for (input_name, input) in &description.inputs {
      let resolved = match input {
        InputRef::Build { build } => {
          let address = self.visit(build)?;
          dependencies.push(address.clone());
          ResolvedInput::Build(address)
        }
        InputRef::Store { store } => {
          if !self.store.has(store) {
            return Err(GraphError::UnresolvedReference {
              from: name.to_string(),
              reference: format!("store entry {}", store),
            });
          }
          ResolvedInput::Store(store.clone())
        }
        InputRef::Path { path } => {
          if !path.exists() {
            return Err(GraphError::UnresolvedReference {
              from: name.to_string(),
              reference: format!("source {}", path.display()),
            });
          }
          let hash = hash_path(path).map_err(|source| GraphError::Source {
            name: name.to_string(),
            source,
          })?;
          let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| input_name.clone());
          sources.insert(input_name.clone(), path.clone());
          ResolvedInput::Source { name: file_name, hash }
        }
      };
      inputs.insert(input_name.clone(), resolved);
    }

    let resolved = ResolvedDescription::new(description, inputs);
    let address = resolved.address().map_err(|source| GraphError::Hash {
      name: name.to_string(),
      source,
    })?;

    let idx = *self
      .indices
      .entry(address.clone())
      .or_insert_with(|| self.graph.add_node(address.clone()));
    for dependency in &dependencies {
      let dep_idx = self.indices[dependency];
      self.graph.update_edge(dep_idx, idx, ());
    }
    self.nodes.entry(address.clone()).or_insert_with(|| GraphNode {
      name: name.to_string(),
      description: description.clone(),
      resolved,
      sources,
    });

    self.stack.pop();
    self.marks.insert(name.to_string(), Mark::Done(address.clone()));
    debug!(name = %name, address = %address, "resolved description");

    Ok(address)
  }
}
