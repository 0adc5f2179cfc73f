mod build;
mod info;
mod plan;

use std::path::Path;

use anyhow::{Context, Result};

use cairn_lib::graph::ExecutionGraph;
use cairn_lib::manifest::Manifest;
use cairn_lib::platform::paths::store_dir;
use cairn_lib::store::ContentStore;

pub use build::cmd_build;
pub use info::cmd_info;
pub use plan::cmd_plan;

/// The store at `--store`, or the default location.
fn open_store(store: Option<&Path>) -> Result<ContentStore> {
  let root = store.map(Path::to_path_buf).unwrap_or_else(store_dir);
  ContentStore::open(root.clone()).with_context(|| format!("Failed to open store: {}", root.display()))
}

/// Load `manifest` and resolve the graph reachable from `roots`.
fn resolve(manifest: &Path, roots: &[String], store: &ContentStore) -> Result<ExecutionGraph> {
  let manifest =
    Manifest::from_file(manifest).with_context(|| format!("Failed to load manifest: {}", manifest.display()))?;
  let roots = manifest.roots(roots)?;
  ExecutionGraph::resolve(&manifest, &roots, store).context("Failed to resolve build graph")
}
