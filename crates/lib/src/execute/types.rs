//! Types for build execution.
//!
//! This module defines the error types, report, events and configuration
//! for executing an [`ExecutionGraph`](crate::graph::ExecutionGraph).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::materialize::MaterializeError;
use crate::store::{StoreEntry, StoreError};
use crate::util::hash::ContentAddress;

/// Errors that can occur during build execution.
///
/// Most variants fail only the node they occur on (and everything depending
/// on it). Those classified by [`is_fatal`](Self::is_fatal) abort the whole
/// request.
#[derive(Debug, Error)]
pub enum ExecuteError {
  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Materialize(#[from] MaterializeError),

  /// The builder ran and exited unsuccessfully.
  #[error("{name} ({address}): builder exited with {}; log: {}", describe_status(*status), log.display())]
  BuildFailed {
    name: String,
    address: ContentAddress,
    /// Exit code, `None` when the builder was killed by a signal.
    status: Option<i32>,
    log: PathBuf,
  },

  #[error("{name} ({address}): declared output '{output}' was not produced")]
  MissingOutput {
    name: String,
    address: ContentAddress,
    output: String,
  },

  #[error("{name}: targets platform {platform}, host is {host}")]
  UnsupportedPlatform { name: String, platform: String, host: String },

  #[error("{name}: failed to start builder {program}: {source}")]
  Spawn {
    name: String,
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("{path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("build task panicked: {0}")]
  TaskPanicked(String),

  #[error("build cancelled")]
  Cancelled,
}

fn describe_status(status: Option<i32>) -> String {
  match status {
    Some(code) => format!("status {}", code),
    None => "a signal".to_string(),
  }
}

impl ExecuteError {
  pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
    let path = path.into();
    move |source| Self::Io { path, source }
  }

  /// Whether the error aborts the whole request instead of one subtree.
  ///
  /// Store corruption and unmaterialized references mean the orchestrator's
  /// own guarantees no longer hold, so nothing built afterwards can be trusted.
  pub fn is_fatal(&self) -> bool {
    matches!(
      self,
      Self::Store(StoreError::Corruption { .. })
        | Self::Materialize(MaterializeError::UnmaterializedReference { .. })
        | Self::TaskPanicked(_)
        | Self::Cancelled
    )
  }

  /// Whether the failure happened after a builder process was started.
  pub(crate) fn ran_builder(&self) -> bool {
    matches!(self, Self::BuildFailed { .. } | Self::MissingOutput { .. })
  }
}

/// What happened to a node, as reported on the event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEventKind {
  /// A sealed entry already existed; no builder ran.
  Cached,
  /// The builder process was spawned.
  Started,
  /// The entry was sealed.
  Finished,
  Failed { error: String },
  /// A dependency failed, so the node was never attempted.
  Skipped { dependency: ContentAddress },
}

#[derive(Debug, Clone)]
pub struct BuildEvent {
  pub address: ContentAddress,
  pub name: String,
  pub kind: BuildEventKind,
  pub at: Instant,
}

/// Outcome of one build request.
#[derive(Debug, Default)]
pub struct BuildReport {
  /// Entries built by this request.
  pub realized: BTreeMap<ContentAddress, StoreEntry>,

  /// Entries that were already in the store.
  pub cached: BTreeMap<ContentAddress, StoreEntry>,

  /// Nodes whose own build failed.
  pub failed: BTreeMap<ContentAddress, ExecuteError>,

  /// Nodes not attempted, mapped to the failed dependency responsible.
  pub skipped: BTreeMap<ContentAddress, ContentAddress>,

  pub(crate) invocations: usize,
}

impl BuildReport {
  /// True when every node is either realized or cached.
  pub fn is_success(&self) -> bool {
    self.failed.is_empty() && self.skipped.is_empty()
  }

  /// Number of builder processes that ran.
  pub fn invocations(&self) -> usize {
    self.invocations
  }

  /// Number of nodes accounted for.
  pub fn total(&self) -> usize {
    self.realized.len() + self.cached.len() + self.failed.len() + self.skipped.len()
  }

  /// The store entry for `address`, whether it was built or cached.
  pub fn entry(&self, address: &ContentAddress) -> Option<&StoreEntry> {
    self.realized.get(address).or_else(|| self.cached.get(address))
  }
}

/// Configuration for build execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of builders running at once.
  pub parallelism: usize,

  /// Extra attempts when a builder fails to start. Non-zero exits are never retried.
  pub retries: u32,

  /// Re-hash cached entries before reusing them.
  pub verify_cache: bool,

  pub events: Option<UnboundedSender<BuildEvent>>,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
      retries: 0,
      verify_cache: false,
      events: None,
    }
  }
}

impl ExecuteConfig {
  pub(crate) fn emit(&self, address: &ContentAddress, name: &str, kind: BuildEventKind) {
    if let Some(events) = &self.events {
      // A dropped receiver only means nobody is listening.
      let _ = events.send(BuildEvent {
        address: address.clone(),
        name: name.to_string(),
        kind,
        at: Instant::now(),
      });
    }
  }
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
