//! The content store.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::consts::{COMPLETE_MARKER, MARKER_VERSION};
use crate::platform::paths::store_dir;
use crate::util::hash::{ContentAddress, ContentHash, hash_directory, hash_path};

use super::lock::AddressLock;
use super::types::{EntryMarker, StoreEntry, StoreError};

/// Entries excluded when hashing an entry directory.
const ENTRY_HASH_EXCLUSIONS: &[&str] = &[COMPLETE_MARKER];

const OBJ_DIR: &str = "obj";
const SRC_DIR: &str = "src";
const LOG_DIR: &str = "log";
const TMP_DIR: &str = "tmp";
const LOCKS_DIR: &str = "locks";

/// Content-addressed storage rooted at one directory.
///
/// Cloning is cheap; clones share the same on-disk store.
#[derive(Debug, Clone)]
pub struct ContentStore {
  root: PathBuf,
}

impl ContentStore {
  /// Open (creating if needed) the store at `root`.
  pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
    let root = root.into();
    for dir in [OBJ_DIR, SRC_DIR, LOG_DIR, TMP_DIR, LOCKS_DIR] {
      let path = root.join(dir);
      fs::create_dir_all(&path).map_err(StoreError::io(&path))?;
    }
    let root = dunce::canonicalize(&root).unwrap_or(root);
    debug!(root = %root.display(), "opened store");
    Ok(Self { root })
  }

  /// Open the store at `CAIRN_STORE` or the default location.
  pub fn open_default() -> Result<Self, StoreError> {
    Self::open(store_dir())
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn entry_path(&self, address: &ContentAddress) -> PathBuf {
    self.root.join(OBJ_DIR).join(address.as_str())
  }

  pub fn log_path(&self, address: &ContentAddress) -> PathBuf {
    self.root.join(LOG_DIR).join(format!("{}.log", address))
  }

  /// Scratch directory for one build of `address`.
  pub fn tmp_path(&self, address: &ContentAddress) -> PathBuf {
    self.root.join(TMP_DIR).join(address.as_str())
  }

  fn lock_path(&self, address: &ContentAddress) -> PathBuf {
    self.root.join(LOCKS_DIR).join(format!("{}.lock", address))
  }

  fn marker_path(&self, address: &ContentAddress) -> PathBuf {
    self.entry_path(address).join(COMPLETE_MARKER)
  }

  /// Whether a sealed entry exists at `address`.
  pub fn has(&self, address: &ContentAddress) -> bool {
    self.read_marker(address).is_ok()
  }

  /// The sealed entry at `address`.
  pub fn get(&self, address: &ContentAddress) -> Result<StoreEntry, StoreError> {
    let marker = self.read_marker(address)?;
    Ok(self.entry_from_marker(address, marker))
  }

  /// Re-hash a sealed entry and compare it with its marker.
  pub fn verify(&self, address: &ContentAddress) -> Result<StoreEntry, StoreError> {
    let entry = self.get(address)?;
    let actual = hash_directory(&entry.path, ENTRY_HASH_EXCLUSIONS)?;
    if actual != entry.output_hash {
      warn!(address = %address, expected = %entry.output_hash, actual = %actual, "store entry modified after sealing");
      return Err(StoreError::Corruption {
        address: address.clone(),
        expected: entry.output_hash,
        actual,
      });
    }
    Ok(entry)
  }

  /// Block until this process holds the write lock for `address`.
  pub fn lock(&self, address: &ContentAddress) -> Result<AddressLock, StoreError> {
    Ok(AddressLock::acquire(&self.lock_path(address), address)?)
  }

  /// Take the write lock for `address` without waiting.
  pub fn try_lock(&self, address: &ContentAddress) -> Result<AddressLock, StoreError> {
    Ok(AddressLock::try_acquire(&self.lock_path(address), address)?)
  }

  /// Move `staged` into the store as the entry for `address` and seal it.
  ///
  /// First writer wins: if the address is already sealed with identical
  /// content the call is a no-op returning the existing entry, and the staged
  /// directory is discarded. Different content fails with
  /// [`StoreError::Corruption`].
  pub fn put(
    &self,
    address: &ContentAddress,
    staged: &Path,
    outputs: &[String],
    exit_status: i32,
  ) -> Result<StoreEntry, StoreError> {
    let lock = self.lock(address)?;
    self.put_locked(&lock, staged, outputs, exit_status)
  }

  /// [`put`](Self::put) for a caller already holding the address lock.
  ///
  /// `staged` may be the entry path itself, in which case the entry is sealed in place.
  pub fn put_locked(
    &self,
    lock: &AddressLock,
    staged: &Path,
    outputs: &[String],
    exit_status: i32,
  ) -> Result<StoreEntry, StoreError> {
    let address = lock.address();
    let entry_path = self.entry_path(address);
    let in_place = staged == entry_path;
    let staged_hash = hash_directory(staged, ENTRY_HASH_EXCLUSIONS)?;

    if let Ok(existing) = self.read_marker(address) {
      if existing.output_hash != staged_hash {
        return Err(StoreError::Corruption {
          address: address.clone(),
          expected: existing.output_hash,
          actual: staged_hash,
        });
      }
      debug!(address = %address, "identical entry already sealed");
      if !in_place {
        fs::remove_dir_all(staged).map_err(StoreError::io(staged))?;
      }
      return Ok(self.entry_from_marker(address, existing));
    }

    if !in_place {
      if entry_path.exists() {
        fs::remove_dir_all(&entry_path).map_err(StoreError::io(&entry_path))?;
      }
      move_dir(staged, &entry_path)?;
    }

    let marker = EntryMarker {
      version: MARKER_VERSION,
      status: "complete".to_string(),
      output_hash: staged_hash,
      exit_status,
      outputs: outputs.to_vec(),
      completed_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
    };
    self.write_marker(address, &marker)?;

    info!(address = %address, path = %entry_path.display(), "sealed store entry");
    Ok(self.entry_from_marker(address, marker))
  }

  /// Remove whatever an interrupted build left at `address`.
  ///
  /// Sealed entries are never touched.
  pub fn clear_partial(&self, lock: &AddressLock) -> Result<(), StoreError> {
    let address = lock.address();
    if self.has(address) {
      return Ok(());
    }

    for path in [self.entry_path(address), self.tmp_path(address)] {
      if path.exists() {
        debug!(path = %path.display(), "removing partial build");
        fs::remove_dir_all(&path).map_err(StoreError::io(&path))?;
      }
    }
    Ok(())
  }

  /// Store path of a source with the given content hash.
  pub fn source_path(&self, name: &str, hash: &ContentHash) -> PathBuf {
    self.root.join(SRC_DIR).join(format!("{}-{}", hash.short(), name))
  }

  /// Copy a local file or directory into the store.
  ///
  /// `expected` is the hash computed when the graph was resolved; a source that
  /// changed since then is rejected rather than stored under a stale hash.
  /// Importing the same content twice is a no-op.
  pub fn import_source(&self, source: &Path, name: &str, expected: &ContentHash) -> Result<PathBuf, StoreError> {
    let dest = self.source_path(name, expected);
    if dest.exists() {
      return Ok(dest);
    }

    let staging = tempfile::Builder::new()
      .prefix("src-")
      .tempdir_in(self.root.join(TMP_DIR))
      .map_err(StoreError::io(self.root.join(TMP_DIR)))?;
    let staged = staging.path().join(name);
    copy_tree(source, &staged)?;

    if hash_path(&staged)? != *expected {
      return Err(StoreError::SourceChanged {
        path: source.to_path_buf(),
      });
    }

    match fs::rename(&staged, &dest) {
      Ok(()) => {}
      // Lost a race against another importer of the same content.
      Err(_) if dest.exists() => {}
      Err(e) => return Err(StoreError::io(&dest)(e)),
    }

    debug!(source = %source.display(), dest = %dest.display(), "imported source");
    Ok(dest)
  }

  fn read_marker(&self, address: &ContentAddress) -> Result<EntryMarker, StoreError> {
    let path = self.marker_path(address);
    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(StoreError::NotFound(address.clone())),
      Err(e) => return Err(StoreError::io(&path)(e)),
    };

    let marker: EntryMarker = serde_json::from_str(&content).map_err(|e| StoreError::Marker {
      address: address.clone(),
      message: e.to_string(),
    })?;

    if marker.version != MARKER_VERSION {
      return Err(StoreError::Marker {
        address: address.clone(),
        message: format!("unsupported marker version {} (expected {})", marker.version, MARKER_VERSION),
      });
    }
    Ok(marker)
  }

  fn write_marker(&self, address: &ContentAddress, marker: &EntryMarker) -> Result<(), StoreError> {
    let path = self.marker_path(address);
    let tmp = path.with_extension("tmp");
    let content = serde_json::to_string(marker).map_err(|e| StoreError::Marker {
      address: address.clone(),
      message: e.to_string(),
    })?;

    fs::write(&tmp, format!("{}\n", content)).map_err(StoreError::io(&tmp))?;
    fs::rename(&tmp, &path).map_err(StoreError::io(&path))
  }

  fn entry_from_marker(&self, address: &ContentAddress, marker: EntryMarker) -> StoreEntry {
    let path = self.entry_path(address);
    let log = Some(self.log_path(address)).filter(|p| p.exists());

    StoreEntry {
      address: address.clone(),
      outputs: marker.outputs.iter().map(|o| path.join(o)).collect(),
      path,
      log,
      exit_status: marker.exit_status,
      output_hash: marker.output_hash,
      completed_at_unix: marker.completed_at_unix,
    }
  }
}

fn move_dir(from: &Path, to: &Path) -> Result<(), StoreError> {
  if fs::rename(from, to).is_ok() {
    return Ok(());
  }
  // Different filesystem: copy, then drop the original.
  copy_tree(from, to)?;
  fs::remove_dir_all(from).map_err(StoreError::io(from))
}

/// Recursively copy a file or directory, preserving permissions and symlinks.
fn copy_tree(from: &Path, to: &Path) -> Result<(), StoreError> {
  for entry in WalkDir::new(from).follow_links(false) {
    let entry = entry.map_err(|e| StoreError::Io {
      path: from.to_path_buf(),
      source: e.into(),
    })?;
    let rel = entry.path().strip_prefix(from).unwrap_or(Path::new(""));
    let target = if rel.as_os_str().is_empty() {
      to.to_path_buf()
    } else {
      to.join(rel)
    };

    let file_type = entry.file_type();
    if file_type.is_dir() {
      fs::create_dir_all(&target).map_err(StoreError::io(&target))?;
    } else if file_type.is_symlink() {
      let link = fs::read_link(entry.path()).map_err(StoreError::io(entry.path()))?;
      symlink(&link, &target).map_err(StoreError::io(&target))?;
    } else {
      fs::copy(entry.path(), &target).map_err(StoreError::io(&target))?;
    }
  }
  Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
  std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
  std::os::windows::fs::symlink_file(target, link)
}
