//! Per-address advisory file locks.
//!
//! Every store address has its own lock file under `<store>/locks/`. Holding
//! the lock is required to create or seal the entry at that address, which
//! serializes concurrent writers of the same address (within one process and
//! across processes) while leaving other addresses free.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::util::hash::ContentAddress;

#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub address: ContentAddress,
}

#[derive(Debug, Error)]
pub enum LockError {
  #[error("address {address} is locked by PID {pid} (since Unix timestamp {started_at_unix}); lock file: {lock_path}")]
  Contention {
    address: ContentAddress,
    pid: u32,
    started_at_unix: u64,
    lock_path: PathBuf,
  },

  #[error("address is locked (could not read lock metadata); lock file: {lock_path}")]
  ContentionUnknown { lock_path: PathBuf },

  #[error("failed to open lock file {lock_path}: {source}")]
  OpenFile {
    lock_path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// An exclusive lock on one store address, released on drop.
#[derive(Debug)]
pub struct AddressLock {
  file: File,
  address: ContentAddress,
  lock_path: PathBuf,
}

impl AddressLock {
  /// Block until the lock for `address` is held.
  pub fn acquire(lock_path: &Path, address: &ContentAddress) -> Result<Self, LockError> {
    let file = open_lock_file(lock_path)?;
    lock_file(&file, true).map_err(LockError::LockFailed)?;
    Self::finish(file, lock_path, address)
  }

  /// Take the lock without waiting, failing with a contention error if held elsewhere.
  pub fn try_acquire(lock_path: &Path, address: &ContentAddress) -> Result<Self, LockError> {
    let file = open_lock_file(lock_path)?;

    if let Err(err) = lock_file(&file, false) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(read_contention_error(lock_path));
      }
      return Err(LockError::LockFailed(err));
    }

    Self::finish(file, lock_path, address)
  }

  fn finish(file: File, lock_path: &Path, address: &ContentAddress) -> Result<Self, LockError> {
    write_metadata(&file, address)?;
    trace!(address = %address, "address lock acquired");
    Ok(Self {
      file,
      address: address.clone(),
      lock_path: lock_path.to_path_buf(),
    })
  }

  pub fn address(&self) -> &ContentAddress {
    &self.address
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }

  /// Read the metadata through the held handle.
  ///
  /// Opening a second handle would fail on Windows, where locks are mandatory.
  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }
}

fn open_lock_file(lock_path: &Path) -> Result<File, LockError> {
  OpenOptions::new()
    .read(true)
    .write(true)
    .create(true)
    .truncate(false)
    .open(lock_path)
    .map_err(|source| LockError::OpenFile {
      lock_path: lock_path.to_path_buf(),
      source,
    })
}

fn write_metadata(file: &File, address: &ContentAddress) -> Result<(), LockError> {
  let metadata = LockMetadata {
    version: 1,
    pid: std::process::id(),
    started_at_unix: SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs(),
    address: address.clone(),
  };

  file.set_len(0).map_err(LockError::WriteMetadata)?;
  let mut writer = io::BufWriter::new(file);
  writer.seek(SeekFrom::Start(0)).map_err(LockError::WriteMetadata)?;
  serde_json::to_writer(&mut writer, &metadata).map_err(|e| LockError::WriteMetadata(io::Error::other(e)))?;
  writer.flush().map_err(LockError::WriteMetadata)?;

  Ok(())
}

fn read_contention_error(lock_path: &Path) -> LockError {
  if let Ok(mut file) = File::open(lock_path) {
    let mut contents = String::new();
    if file.read_to_string(&mut contents).is_ok()
      && let Ok(metadata) = serde_json::from_str::<LockMetadata>(&contents)
    {
      return LockError::Contention {
        address: metadata.address,
        pid: metadata.pid,
        started_at_unix: metadata.started_at_unix,
        lock_path: lock_path.to_path_buf(),
      };
    }
  }

  LockError::ContentionUnknown {
    lock_path: lock_path.to_path_buf(),
  }
}

#[cfg(unix)]
fn lock_file(file: &File, block: bool) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  let operation = if block {
    FlockOperation::LockExclusive
  } else {
    FlockOperation::NonBlockingLockExclusive
  };

  flock(file.as_fd(), operation).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn lock_file(file: &File, block: bool) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;
  let flags = if block {
    LOCKFILE_EXCLUSIVE_LOCK
  } else {
    LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK
  };

  // SAFETY: OVERLAPPED is a plain data struct that is valid when zero-initialized,
  // and the handle is owned by `file` for the duration of the call.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(handle, flags, 0, 1, 0, &mut overlapped)
  };

  if result == 0 {
    Err(io::Error::last_os_error())
  } else {
    Ok(())
  }
}
