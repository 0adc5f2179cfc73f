//! Build execution.
//!
//! This module runs an [`ExecutionGraph`] against a [`ContentStore`]. It handles:
//! - Ready-queue scheduling: a node starts as soon as its dependencies are done
//! - Bounded parallelism across independent subtrees
//! - Cache hits for already-sealed entries, without running a builder
//! - Failure propagation: descendants of a failed node are skipped while
//!   unrelated subtrees keep going
//! - Aborting everything on fatal errors and cancellation

mod types;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs::File;
use std::future::Future;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::description::ResolvedInput;
use crate::graph::{ExecutionGraph, GraphNode};
use crate::materialize::{LaunchSpec, materialize};
use crate::platform::{can_build, platform_triple};
use crate::store::{AddressLock, ContentStore, LockError, StoreEntry, StoreError};
use crate::util::hash::ContentAddress;

pub use types::{BuildEvent, BuildEventKind, BuildReport, ExecuteConfig, ExecuteError};

/// How a node was satisfied.
#[derive(Debug)]
enum NodeOutcome {
  Cached(StoreEntry),
  Built(StoreEntry),
}

type TaskResult = (ContentAddress, Result<NodeOutcome, ExecuteError>);

/// Execute every node of `graph`.
///
/// Node failures are collected in the returned [`BuildReport`]; only fatal
/// errors (see [`ExecuteError::is_fatal`]) are returned as `Err`.
pub async fn execute(
  graph: &ExecutionGraph,
  store: &ContentStore,
  config: &ExecuteConfig,
) -> Result<BuildReport, ExecuteError> {
  execute_until(graph, store, config, std::future::pending()).await
}

/// [`execute`], aborting with [`ExecuteError::Cancelled`] once `cancel` completes.
///
/// In-flight builders are killed. Whatever they left behind stays unsealed and
/// is cleared before the address is next built.
pub async fn execute_until(
  graph: &ExecutionGraph,
  store: &ContentStore,
  config: &ExecuteConfig,
  cancel: impl Future<Output = ()>,
) -> Result<BuildReport, ExecuteError> {
  info!(nodes = graph.len(), parallelism = config.parallelism, "starting build execution");

  let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));
  let mut report = BuildReport::default();
  let mut tasks: JoinSet<TaskResult> = JoinSet::new();

  let order = graph.topological_order();
  let mut pending: HashMap<&ContentAddress, usize> =
    order.iter().map(|&address| (address, graph.dependencies(address).len())).collect();
  let mut ready: VecDeque<&ContentAddress> = order.iter().copied().filter(|address| pending[address] == 0).collect();

  tokio::pin!(cancel);

  loop {
    while let Some(address) = ready.pop_front() {
      let Some(node) = graph.node(address) else {
        continue;
      };
      let address = address.clone();
      let node = node.clone();
      let store = store.clone();
      let config = config.clone();
      let semaphore = semaphore.clone();

      tasks.spawn(async move {
        let result = realize_node(&address, &node, &store, &config, &semaphore).await;
        (address, result)
      });
    }

    let joined = tokio::select! {
      _ = &mut cancel => {
        warn!(in_flight = tasks.len(), "build cancelled");
        abort(&mut tasks).await;
        return Err(ExecuteError::Cancelled);
      }
      joined = tasks.join_next() => joined,
    };

    let Some(joined) = joined else {
      break;
    };

    let (address, result) = match joined {
      Ok(done) => done,
      Err(e) => {
        error!(error = %e, "build task panicked");
        abort(&mut tasks).await;
        return Err(ExecuteError::TaskPanicked(e.to_string()));
      }
    };
    let name = graph.node(&address).map(|n| n.name.as_str()).unwrap_or_default();

    let completed = match result {
      Ok(NodeOutcome::Cached(entry)) => {
        debug!(name = %name, address = %address, "cache hit");
        config.emit(&address, name, BuildEventKind::Cached);
        report.cached.insert(address.clone(), entry);
        true
      }
      Ok(NodeOutcome::Built(entry)) => {
        info!(name = %name, address = %address, "build succeeded");
        config.emit(&address, name, BuildEventKind::Finished);
        report.invocations += 1;
        report.realized.insert(address.clone(), entry);
        true
      }
      Err(e) if e.is_fatal() => {
        error!(name = %name, address = %address, error = %e, "fatal error, aborting");
        abort(&mut tasks).await;
        return Err(e);
      }
      Err(e) => {
        error!(name = %name, address = %address, error = %e, "build failed");
        config.emit(&address, name, BuildEventKind::Failed { error: e.to_string() });
        if e.ran_builder() {
          report.invocations += 1;
        }
        report.failed.insert(address.clone(), e);

        for descendant in graph.descendants(&address) {
          if report.skipped.contains_key(descendant) {
            continue;
          }
          let skipped_name = graph.node(descendant).map(|n| n.name.as_str()).unwrap_or_default();
          warn!(name = %skipped_name, address = %descendant, failed_dep = %address, "skipping build due to failed dependency");
          config.emit(
            descendant,
            skipped_name,
            BuildEventKind::Skipped {
              dependency: address.clone(),
            },
          );
          report.skipped.insert(descendant.clone(), address.clone());
        }
        false
      }
    };

    if completed {
      for dependent in graph.dependents(&address) {
        if let Some(count) = pending.get_mut(dependent) {
          *count = count.saturating_sub(1);
          if *count == 0 && !report.skipped.contains_key(dependent) {
            ready.push_back(dependent);
          }
        }
      }
    }
  }

  info!(
    realized = report.realized.len(),
    cached = report.cached.len(),
    failed = report.failed.len(),
    skipped = report.skipped.len(),
    "build execution complete"
  );

  Ok(report)
}

/// Abort all tasks and wait until they are gone, so their builders are killed.
async fn abort(tasks: &mut JoinSet<TaskResult>) {
  tasks.abort_all();
  while tasks.join_next().await.is_some() {}
}

/// The sealed entry at `address`, if there is a usable one.
fn cached_entry(store: &ContentStore, address: &ContentAddress, verify: bool) -> Result<Option<StoreEntry>, StoreError> {
  let entry = match store.get(address) {
    Ok(entry) => entry,
    Err(StoreError::NotFound(_)) => return Ok(None),
    Err(StoreError::Marker { message, .. }) => {
      warn!(address = %address, error = %message, "unreadable completion marker, rebuilding");
      return Ok(None);
    }
    Err(e) => return Err(e),
  };

  if verify {
    store.verify(address)?;
  }
  Ok(Some(entry))
}

/// Take the write lock for `address`, waiting for another build that holds it.
fn lock_address(store: &ContentStore, address: &ContentAddress) -> Result<AddressLock, StoreError> {
  match store.try_lock(address) {
    Err(StoreError::Lock(held @ (LockError::Contention { .. } | LockError::ContentionUnknown { .. }))) => {
      info!(address = %address, holder = %held, "address locked by another build, waiting");
      store.lock(address)
    }
    result => result,
  }
}

/// Realize a single node: reuse its sealed entry or run its builder and seal the result.
async fn realize_node(
  address: &ContentAddress,
  node: &GraphNode,
  store: &ContentStore,
  config: &ExecuteConfig,
  semaphore: &Semaphore,
) -> Result<NodeOutcome, ExecuteError> {
  if let Some(entry) = cached_entry(store, address, config.verify_cache)? {
    return Ok(NodeOutcome::Cached(entry));
  }

  let _permit = semaphore.acquire().await.map_err(|_| ExecuteError::Cancelled)?;

  let lock = {
    let store = store.clone();
    let address = address.clone();
    tokio::task::spawn_blocking(move || lock_address(&store, &address))
      .await
      .map_err(|e| ExecuteError::TaskPanicked(e.to_string()))??
  };

  // Another process may have sealed it while we waited for the lock.
  if let Some(entry) = cached_entry(store, address, config.verify_cache)? {
    return Ok(NodeOutcome::Cached(entry));
  }

  let platform = &node.description.platform;
  if !can_build(platform) {
    return Err(ExecuteError::UnsupportedPlatform {
      name: node.name.clone(),
      platform: platform.clone(),
      host: platform_triple(),
    });
  }

  info!(name = %node.name, address = %address, "building");

  store.clear_partial(&lock)?;
  let out = store.entry_path(address);
  let tmp = store.tmp_path(address);
  for dir in [&out, &tmp] {
    std::fs::create_dir_all(dir).map_err(ExecuteError::io(dir))?;
  }

  let inputs = input_paths(node, store)?;
  let spec = materialize(node, &inputs, &out, &tmp)?;

  let log = store.log_path(address);
  let status = run_builder(address, node, &spec, &log, config).await?;

  if !status.success() {
    return Err(ExecuteError::BuildFailed {
      name: node.name.clone(),
      address: address.clone(),
      status: status.code(),
      log,
    });
  }

  if let Some(output) = node.description.outputs.iter().find(|o| !out.join(o).exists()) {
    return Err(ExecuteError::MissingOutput {
      name: node.name.clone(),
      address: address.clone(),
      output: output.clone(),
    });
  }

  std::fs::remove_dir_all(&tmp).map_err(ExecuteError::io(&tmp))?;

  let entry = seal(store, &lock, &out, node, status)?;
  Ok(NodeOutcome::Built(entry))
}

fn seal(
  store: &ContentStore,
  lock: &AddressLock,
  out: &Path,
  node: &GraphNode,
  status: ExitStatus,
) -> Result<StoreEntry, ExecuteError> {
  Ok(store.put_locked(lock, out, &node.description.outputs, status.code().unwrap_or_default())?)
}

/// Store paths for every declared input, importing local sources on the way.
fn input_paths(node: &GraphNode, store: &ContentStore) -> Result<BTreeMap<String, std::path::PathBuf>, ExecuteError> {
  let mut paths = BTreeMap::new();

  for (input_name, input) in &node.resolved.inputs {
    let path = match input {
      ResolvedInput::Build(address) | ResolvedInput::Store(address) => store.entry_path(address),
      ResolvedInput::Source { name, hash } => {
        let Some(source) = node.sources.get(input_name) else {
          // Graph construction records a path for every source input.
          continue;
        };
        store.import_source(source, name, hash)?
      }
    };
    paths.insert(input_name.clone(), path);
  }

  Ok(paths)
}

/// Spawn the builder with output going to `log`, and wait for it.
///
/// Failures to start the process are retried up to `config.retries` times.
async fn run_builder(
  address: &ContentAddress,
  node: &GraphNode,
  spec: &LaunchSpec,
  log: &Path,
  config: &ExecuteConfig,
) -> Result<ExitStatus, ExecuteError> {
  let mut attempt = 0;

  let mut child = loop {
    let stdout = File::create(log).map_err(ExecuteError::io(log))?;
    let stderr = stdout.try_clone().map_err(ExecuteError::io(log))?;

    let mut command = spec.command();
    command
      .stdout(Stdio::from(stdout))
      .stderr(Stdio::from(stderr))
      .kill_on_drop(true);

    debug!(program = %spec.program, args = ?spec.args, cwd = %spec.cwd.display(), "spawning builder");

    match command.spawn() {
      Ok(child) => break child,
      Err(e) if attempt < config.retries => {
        attempt += 1;
        warn!(name = %node.name, attempt, error = %e, "failed to start builder, retrying");
      }
      Err(source) => {
        return Err(ExecuteError::Spawn {
          name: node.name.clone(),
          program: spec.program.clone(),
          source,
        });
      }
    }
  };

  config.emit(address, &node.name, BuildEventKind::Started);

  child.wait().await.map_err(ExecuteError::io(log))
}
