use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

use crate::description::{BuildDescription, DescriptionError, ResolvedDescription};
use crate::manifest::ManifestError;
use crate::util::hash::{DirHashError, HashError};

#[derive(Debug, Error)]
pub enum GraphError {
  /// The traversal reached a description that is still being resolved.
  ///
  /// `path` lists the names along the cycle, starting and ending with the
  /// same name (`["a", "a"]` for a self-reference).
  #[error("dependency cycle: {}", path.join(" -> "))]
  CyclicDependency { path: Vec<String> },

  #[error("{from}: unresolved reference to {reference}")]
  UnresolvedReference { from: String, reference: String },

  #[error("invalid description: {0}")]
  InvalidDescription(#[from] DescriptionError),

  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error("failed to compute address of {name}: {source}")]
  Hash {
    name: String,
    #[source]
    source: HashError,
  },

  #[error("failed to hash source for {name}: {source}")]
  Source {
    name: String,
    #[source]
    source: DirHashError,
  },
}

/// One resolved description in an [`ExecutionGraph`](super::ExecutionGraph).
#[derive(Debug, Clone)]
pub struct GraphNode {
  pub name: String,
  pub description: BuildDescription,
  /// The normalized form the node's address was computed from.
  pub resolved: ResolvedDescription,
  /// Local paths of source inputs, by input name.
  pub sources: BTreeMap<String, PathBuf>,
}
