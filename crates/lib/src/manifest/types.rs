//! Manifest types for cairn.
//!
//! # Format
//!
//! ```json
//! {
//!   "root": "app",
//!   "builds": [
//!     {
//!       "name": "app",
//!       "builder": "/usr/bin/cc",
//!       "args": ["-o", "$${out}/app", "$${input:src}"],
//!       "inputs": { "src": { "path": "main.c" } },
//!       "outputs": ["app"]
//!     }
//!   ]
//! }
//! ```
//!
//! Relative `path` inputs are resolved against the directory holding the
//! manifest file, so a manifest can be built from any working directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::description::{BuildDescription, InputRef};

#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read manifest {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse manifest: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("description name '{0}' is defined more than once")]
  DuplicateName(String),

  #[error("manifest has no root and none was requested")]
  NoRoot,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
  /// Description built when the caller names no root.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub root: Option<String>,

  pub builds: Vec<BuildDescription>,

  #[serde(skip)]
  index: HashMap<String, usize>,
}

impl Manifest {
  pub fn new(builds: Vec<BuildDescription>) -> Result<Self, ManifestError> {
    let mut manifest = Self {
      root: None,
      builds,
      index: HashMap::new(),
    };
    manifest.reindex()?;
    Ok(manifest)
  }

  /// Load a manifest from a JSON file.
  pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
    let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    let base = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let base = dunce::canonicalize(base).unwrap_or_else(|_| base.to_path_buf());

    Self::from_json(&content, &base)
  }

  /// Parse a manifest, resolving relative source paths against `base`.
  pub fn from_json(content: &str, base: &Path) -> Result<Self, ManifestError> {
    let mut manifest: Manifest = serde_json::from_str(content)?;

    for description in &mut manifest.builds {
      for input in description.inputs.values_mut() {
        if let InputRef::Path { path } = input
          && path.is_relative()
        {
          *path = base.join(&*path);
        }
      }
    }

    manifest.reindex()?;
    Ok(manifest)
  }

  fn reindex(&mut self) -> Result<(), ManifestError> {
    self.index.clear();
    for (idx, description) in self.builds.iter().enumerate() {
      if self.index.insert(description.name.clone(), idx).is_some() {
        return Err(ManifestError::DuplicateName(description.name.clone()));
      }
    }
    Ok(())
  }

  pub fn get(&self, name: &str) -> Option<&BuildDescription> {
    self.index.get(name).map(|&idx| &self.builds[idx])
  }

  /// The roots to build: the requested ones, or the manifest default.
  pub fn roots<'a>(&'a self, requested: &'a [String]) -> Result<Vec<&'a str>, ManifestError> {
    if !requested.is_empty() {
      return Ok(requested.iter().map(String::as_str).collect());
    }
    self
      .root
      .as_deref()
      .map(|root| vec![root])
      .ok_or(ManifestError::NoRoot)
  }
}
