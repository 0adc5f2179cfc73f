use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::consts::ANY_PLATFORM;
use crate::util::hash::{ContentAddress, ContentHash, HashError, Hashable};

/// A named input of a description.
///
/// Inputs are always enumerated explicitly; a builder only sees the inputs
/// its description lists, through `$${input:NAME}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputRef {
  /// Another description of the same manifest, by name.
  Build { build: String },
  /// An entry already present in the content store.
  Store { store: ContentAddress },
  /// A local file or directory, imported into the store before use.
  Path { path: PathBuf },
}

impl InputRef {
  pub fn build(name: &str) -> Self {
    Self::Build { build: name.to_string() }
  }

  pub fn store(address: ContentAddress) -> Self {
    Self::Store { store: address }
  }

  pub fn path(path: impl Into<PathBuf>) -> Self {
    Self::Path { path: path.into() }
  }
}

/// The immutable recipe for one store entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildDescription {
  pub name: String,

  /// Target platform triple, or `any`.
  #[serde(default = "default_platform")]
  pub platform: String,

  /// Absolute path of the builder, or a string starting with a placeholder
  /// such as `$${input:cc}/bin/cc`.
  pub builder: String,

  #[serde(default)]
  pub args: Vec<String>,

  #[serde(default)]
  pub env: BTreeMap<String, String>,

  #[serde(default)]
  pub inputs: BTreeMap<String, InputRef>,

  /// Inline build script, reachable from args and env as `$${script}`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub script: Option<String>,

  /// Paths relative to `$${out}` that must exist after a successful run.
  #[serde(default)]
  pub outputs: Vec<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cwd: Option<String>,
}

fn default_platform() -> String {
  ANY_PLATFORM.to_string()
}

impl BuildDescription {
  pub fn new(name: &str, builder: &str) -> Self {
    Self {
      name: name.to_string(),
      platform: default_platform(),
      builder: builder.to_string(),
      args: Vec::new(),
      env: BTreeMap::new(),
      inputs: BTreeMap::new(),
      script: None,
      outputs: Vec::new(),
      cwd: None,
    }
  }

  pub fn with_platform(mut self, platform: &str) -> Self {
    self.platform = platform.to_string();
    self
  }

  pub fn with_args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn with_env(mut self, key: &str, value: &str) -> Self {
    self.env.insert(key.to_string(), value.to_string());
    self
  }

  pub fn with_input(mut self, name: &str, input: InputRef) -> Self {
    self.inputs.insert(name.to_string(), input);
    self
  }

  pub fn with_script(mut self, script: &str) -> Self {
    self.script = Some(script.to_string());
    self
  }

  pub fn with_output(mut self, output: &str) -> Self {
    self.outputs.push(output.to_string());
    self
  }

  pub fn with_cwd(mut self, cwd: &str) -> Self {
    self.cwd = Some(cwd.to_string());
    self
  }
}

/// What an input resolved to during graph construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedInput {
  /// Output of another description in the graph.
  Build(ContentAddress),
  /// A pre-existing store entry.
  Store(ContentAddress),
  /// A local source identified by its file name and content hash.
  Source { name: String, hash: ContentHash },
}

/// The normalized form of a description that its address is computed from.
///
/// The name is left out: two descriptions that differ only in name are the
/// same build and share one store entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDescription {
  pub platform: String,
  pub builder: String,
  pub args: Vec<String>,
  pub env: BTreeMap<String, String>,
  pub inputs: BTreeMap<String, ResolvedInput>,
  pub script: Option<String>,
  pub outputs: Vec<String>,
  pub cwd: Option<String>,
}

impl Hashable for ResolvedDescription {}

impl ResolvedDescription {
  pub fn new(description: &BuildDescription, inputs: BTreeMap<String, ResolvedInput>) -> Self {
    Self {
      platform: description.platform.clone(),
      builder: description.builder.clone(),
      args: description.args.clone(),
      env: description.env.clone(),
      inputs,
      script: description.script.clone(),
      outputs: description.outputs.clone(),
      cwd: description.cwd.clone(),
    }
  }

  pub fn address(&self) -> Result<ContentAddress, HashError> {
    self.compute_hash()
  }
}
