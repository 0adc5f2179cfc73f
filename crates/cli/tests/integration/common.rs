//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Get path to a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Isolated test environment.
///
/// Each test gets its own project directory holding `cairn.json`, and its own store.
pub struct TestEnv {
  pub temp: TempDir,
  pub manifest_path: PathBuf,
}

impl TestEnv {
  /// Copy a fixture manifest into a fresh project as `cairn.json`.
  pub fn from_fixture(name: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let manifest_path = temp.path().join("project").join("cairn.json");
    std::fs::create_dir_all(manifest_path.parent().unwrap()).unwrap();
    std::fs::copy(fixture_path(name), &manifest_path)
      .unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", name, e));
    Self { temp, manifest_path }
  }

  /// Write a file relative to the project directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join("project").join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  /// Store path (isolated per test).
  pub fn store_path(&self) -> PathBuf {
    let p = self.temp.path().join("store");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  pub fn data_path(&self) -> PathBuf {
    let p = self.temp.path().join("data");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Get a pre-configured Command for the cairn binary.
  ///
  /// `CAIRN_STORE` points at the isolated store; `XDG_DATA_HOME` keeps the
  /// default location out of the user's home as well.
  pub fn cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("cairn");
    cmd.env("CAIRN_STORE", self.store_path());
    cmd.env("XDG_DATA_HOME", self.data_path());
    cmd.env_remove("RUST_LOG");
    cmd
  }

  /// `cairn build <manifest>` plus `args`.
  pub fn build(&self, args: &[&str]) -> Command {
    let mut cmd = self.cmd();
    cmd.arg("build").arg(&self.manifest_path).args(args);
    cmd
  }

  /// Run `cairn build --output json` and parse stdout.
  pub fn build_json(&self, args: &[&str]) -> (Option<i32>, serde_json::Value) {
    let output = self.build(args).args(["--output", "json"]).output().unwrap();
    let json = serde_json::from_slice(&output.stdout)
      .unwrap_or_else(|e| panic!("invalid JSON ({}): {}", e, String::from_utf8_lossy(&output.stdout)));
    (output.status.code(), json)
  }
}

/// The node named `name` in a build or plan JSON report.
pub fn node<'a>(json: &'a serde_json::Value, name: &str) -> &'a serde_json::Value {
  json["nodes"]
    .as_array()
    .unwrap()
    .iter()
    .find(|n| n["name"] == name)
    .unwrap_or_else(|| panic!("no node named {name}"))
}
