//! Environment materialization.
//!
//! Turns a resolved graph node plus the store paths of its inputs into the
//! concrete program, arguments, environment and working directory of one
//! builder invocation. Substitution is purely textual; nothing is evaluated
//! by a shell.
//!
//! Builders run in an isolated environment, following Nix-inspired principles:
//! - All inherited environment variables are cleared
//! - `PATH` is set to `/path-not-set`, so undeclared tools fail fast
//! - `HOME` is set to `/homeless-shelter`
//! - `TMPDIR`/`TMP`/`TEMP`/`TEMPDIR` point at the build's scratch directory
//! - `out` is the entry directory the builder must populate
//! - The description's own `env` is applied last

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;

use crate::consts::SOURCE_DATE_EPOCH;
use crate::graph::GraphNode;
use crate::placeholder::{self, PlaceholderError, Resolver};
use crate::platform::platform_triple;

/// File name of the inline script inside the build's scratch directory.
pub const SCRIPT_FILE: &str = ".cairn-script";

#[derive(Debug, Error)]
pub enum MaterializeError {
  /// A placeholder names an input that has no store path.
  ///
  /// Validation rejects undeclared inputs and the executor materializes every
  /// declared one, so reaching this means an internal invariant broke.
  #[error("{description}: input '{input}' was not materialized before launch")]
  UnmaterializedReference { description: String, input: String },

  #[error("{description}: {field}: {source}")]
  Placeholder {
    description: String,
    field: String,
    #[source]
    source: PlaceholderError,
  },

  #[error("failed to write build script {path}: {source}")]
  Script {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Everything needed to spawn one builder process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
  pub program: String,
  pub args: Vec<String>,
  /// The complete environment; nothing is inherited.
  pub env: BTreeMap<String, String>,
  pub cwd: PathBuf,
}

impl LaunchSpec {
  /// A command running this spec with a cleared environment and no stdin.
  pub fn command(&self) -> Command {
    let mut command = Command::new(&self.program);
    command
      .args(&self.args)
      .current_dir(&self.cwd)
      .env_clear()
      .envs(&self.env)
      .stdin(Stdio::null());
    command
  }
}

/// Placeholder values for one node.
struct Bindings {
  out: String,
  inputs: BTreeMap<String, String>,
  script: Option<String>,
}

impl Resolver for Bindings {
  fn resolve_out(&self) -> Result<&str, PlaceholderError> {
    Ok(&self.out)
  }

  fn resolve_input(&self, name: &str) -> Result<&str, PlaceholderError> {
    self
      .inputs
      .get(name)
      .map(String::as_str)
      .ok_or_else(|| PlaceholderError::UnresolvedInput(name.to_string()))
  }

  fn resolve_script(&self) -> Result<&str, PlaceholderError> {
    self.script.as_deref().ok_or(PlaceholderError::NoScript)
  }
}

fn path_string(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

/// Build the launch spec for `node`.
///
/// `inputs` maps every declared input name to its store path, `out` is the
/// entry directory and `tmp` the scratch directory. If the description carries
/// a script it is written to `tmp` first, so `tmp` is created when missing.
pub fn materialize(
  node: &GraphNode,
  inputs: &BTreeMap<String, PathBuf>,
  out: &Path,
  tmp: &Path,
) -> Result<LaunchSpec, MaterializeError> {
  let description = &node.description;

  let script = match &description.script {
    Some(text) => Some(write_script(tmp, text)?),
    None => None,
  };

  let bindings = Bindings {
    out: path_string(out),
    inputs: inputs.iter().map(|(name, path)| (name.clone(), path_string(path))).collect(),
    script: script.as_deref().map(path_string),
  };

  let substitute = |field: &str, value: &str| {
    placeholder::substitute(value, &bindings).map_err(|source| match source {
      PlaceholderError::UnresolvedInput(input) => MaterializeError::UnmaterializedReference {
        description: description.name.clone(),
        input,
      },
      source => MaterializeError::Placeholder {
        description: description.name.clone(),
        field: field.to_string(),
        source,
      },
    })
  };

  let program = substitute("builder", &description.builder)?;
  let args = description
    .args
    .iter()
    .enumerate()
    .map(|(idx, arg)| substitute(&format!("args[{idx}]"), arg))
    .collect::<Result<Vec<_>, _>>()?;

  let mut env = base_env(out, tmp);
  for (key, value) in &description.env {
    env.insert(key.clone(), substitute(&format!("env.{key}"), value)?);
  }

  let cwd = match &description.cwd {
    Some(cwd) => PathBuf::from(substitute("cwd", cwd)?),
    None => tmp.to_path_buf(),
  };

  Ok(LaunchSpec { program, args, env, cwd })
}

fn base_env(out: &Path, tmp: &Path) -> BTreeMap<String, String> {
  let tmp = path_string(tmp);
  let mut env = BTreeMap::new();

  env.insert("PATH".to_string(), "/path-not-set".to_string());
  env.insert("HOME".to_string(), "/homeless-shelter".to_string());
  for key in ["TMPDIR", "TMP", "TEMP", "TEMPDIR"] {
    env.insert(key.to_string(), tmp.clone());
  }
  env.insert("out".to_string(), path_string(out));
  env.insert("LANG".to_string(), "C".to_string());
  env.insert("LC_ALL".to_string(), "C".to_string());
  env.insert("SOURCE_DATE_EPOCH".to_string(), SOURCE_DATE_EPOCH.to_string());
  env.insert("CAIRN_PLATFORM".to_string(), platform_triple());

  env
}

fn write_script(tmp: &Path, text: &str) -> Result<PathBuf, MaterializeError> {
  let path = tmp.join(SCRIPT_FILE);
  let script_err = |source| MaterializeError::Script {
    path: path.clone(),
    source,
  };

  std::fs::create_dir_all(tmp).map_err(script_err)?;
  std::fs::write(&path, text).map_err(script_err)?;

  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).map_err(script_err)?;
  }

  Ok(path)
}
