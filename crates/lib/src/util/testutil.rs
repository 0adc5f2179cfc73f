//! Test utilities for cairn-lib.
//!
//! Builders in tests are `/bin/sh` scripts. With `PATH` unset only shell
//! builtins are available, so scripts stick to `echo`, `printf` and redirects.

use tempfile::TempDir;

use crate::description::BuildDescription;
use crate::execute::ExecuteConfig;
use crate::store::ContentStore;

/// A description running `script` with `/bin/sh -c`.
pub fn sh(name: &str, script: &str) -> BuildDescription {
  BuildDescription::new(name, "/bin/sh").with_args(["-c", script])
}

/// A description writing `content` to `$out/<name>` and declaring it as output.
pub fn sh_write(name: &str, content: &str) -> BuildDescription {
  sh(name, &format!("echo {} > \"$out/{}\"", content, name)).with_output(name)
}

/// A fresh store in a temporary directory; keep the `TempDir` alive.
pub fn temp_store() -> (TempDir, ContentStore) {
  let temp = TempDir::new().unwrap();
  let store = ContentStore::open(temp.path().join("store")).unwrap();
  (temp, store)
}

pub fn test_config() -> ExecuteConfig {
  ExecuteConfig {
    parallelism: 4,
    ..ExecuteConfig::default()
  }
}
