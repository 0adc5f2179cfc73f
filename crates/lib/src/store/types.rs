use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::hash::{ContentAddress, ContentHash, DirHashError};

use super::lock::LockError;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("no store entry at {0}")]
  NotFound(ContentAddress),

  /// The store holds different content than expected for an address.
  ///
  /// Raised when a second writer brings different outputs for a sealed
  /// address, or when a sealed entry no longer matches its recorded hash.
  /// Either way the determinism assumption is broken and results can't be trusted.
  #[error("store corruption at {address}: recorded output hash {expected}, found {actual}")]
  Corruption {
    address: ContentAddress,
    expected: ContentHash,
    actual: ContentHash,
  },

  #[error("unreadable completion marker for {address}: {message}")]
  Marker { address: ContentAddress, message: String },

  #[error("source {path} changed while being imported")]
  SourceChanged { path: PathBuf },

  #[error("hashing failed: {0}")]
  Hash(#[from] DirHashError),

  #[error(transparent)]
  Lock(#[from] LockError),

  #[error("{path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl StoreError {
  pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
    let path = path.into();
    move |source| Self::Io { path, source }
  }
}

/// Content of the completion marker written into a sealed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMarker {
  pub version: u32,
  pub status: String,
  /// Full hash of the entry directory, marker excluded.
  pub output_hash: ContentHash,
  pub exit_status: i32,
  /// Declared outputs, relative to the entry directory.
  pub outputs: Vec<String>,
  pub completed_at_unix: u64,
}

/// A sealed, immutable store entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreEntry {
  pub address: ContentAddress,
  /// The entry directory, `$${out}` of the build that produced it.
  pub path: PathBuf,
  /// Declared outputs as absolute paths.
  pub outputs: Vec<PathBuf>,
  /// Build log, if the entry was produced by a builder run of this store.
  pub log: Option<PathBuf>,
  pub exit_status: i32,
  pub output_hash: ContentHash,
  pub completed_at_unix: u64,
}
