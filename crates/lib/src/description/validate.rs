//! Static checks on a single description.

use std::path::{Component, Path};

use thiserror::Error;

use crate::placeholder::{self, Placeholder, PlaceholderError};
use crate::platform::{self, UnknownPlatform};

use super::{BuildDescription, InputRef};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptionError {
  #[error("description name is empty")]
  EmptyName,

  #[error("{name}: builder '{builder}' is neither an absolute path nor a placeholder")]
  RelativeBuilder { name: String, builder: String },

  #[error("{name}: invalid placeholder in {field}: {source}")]
  Placeholder {
    name: String,
    field: String,
    #[source]
    source: PlaceholderError,
  },

  #[error("{name}: {field} references undeclared input '{input}'")]
  UndeclaredInput { name: String, field: String, input: String },

  #[error("{name}: {field} references $${{script}} but the description has no script")]
  MissingScript { name: String, field: String },

  #[error("{name}: output '{output}' must be a relative path inside $${{out}}")]
  InvalidOutput { name: String, output: String },

  #[error("{name}: input '{input}' names '{address}', which is not a store address")]
  MalformedAddress { name: String, input: String, address: String },

  #[error("{name}: environment variable '{key}' is reserved")]
  ReservedEnv { name: String, key: String },

  #[error("{name}: {source}")]
  Platform {
    name: String,
    #[source]
    source: UnknownPlatform,
  },
}

/// Variables the orchestrator always sets itself.
const RESERVED_ENV: &[&str] = &["out"];

impl BuildDescription {
  /// Check the description on its own, without looking at other descriptions.
  ///
  /// Every placeholder must parse and refer to a declared input; outputs must
  /// stay inside the output directory. Store inputs must be well-formed
  /// addresses so they can only ever name an entry under `obj/`.
  pub fn validate(&self) -> Result<(), DescriptionError> {
    if self.name.trim().is_empty() {
      return Err(DescriptionError::EmptyName);
    }

    platform::validate_target(&self.platform).map_err(|source| DescriptionError::Platform {
      name: self.name.clone(),
      source,
    })?;

    if !self.builder.starts_with("$${") && !Path::new(&self.builder).is_absolute() {
      return Err(DescriptionError::RelativeBuilder {
        name: self.name.clone(),
        builder: self.builder.clone(),
      });
    }

    self.check_field("builder", &self.builder)?;
    for (idx, arg) in self.args.iter().enumerate() {
      self.check_field(&format!("args[{idx}]"), arg)?;
    }
    for (key, value) in &self.env {
      if RESERVED_ENV.contains(&key.as_str()) {
        return Err(DescriptionError::ReservedEnv {
          name: self.name.clone(),
          key: key.clone(),
        });
      }
      self.check_field(&format!("env.{key}"), value)?;
    }
    if let Some(cwd) = &self.cwd {
      self.check_field("cwd", cwd)?;
    }

    for (input, reference) in &self.inputs {
      if let InputRef::Store { store } = reference
        && !store.is_well_formed()
      {
        return Err(DescriptionError::MalformedAddress {
          name: self.name.clone(),
          input: input.clone(),
          address: store.to_string(),
        });
      }
    }

    for output in &self.outputs {
      if !is_contained(output) {
        return Err(DescriptionError::InvalidOutput {
          name: self.name.clone(),
          output: output.clone(),
        });
      }
    }

    Ok(())
  }

  fn check_field(&self, field: &str, value: &str) -> Result<(), DescriptionError> {
    let refs = placeholder::references(value).map_err(|source| DescriptionError::Placeholder {
      name: self.name.clone(),
      field: field.to_string(),
      source,
    })?;

    for reference in refs {
      match reference {
        Placeholder::Input(input) if !self.inputs.contains_key(&input) => {
          return Err(DescriptionError::UndeclaredInput {
            name: self.name.clone(),
            field: field.to_string(),
            input,
          });
        }
        Placeholder::Script if self.script.is_none() => {
          return Err(DescriptionError::MissingScript {
            name: self.name.clone(),
            field: field.to_string(),
          });
        }
        _ => {}
      }
    }

    Ok(())
  }
}

fn is_contained(output: &str) -> bool {
  let path = Path::new(output);
  !output.is_empty()
    && path
      .components()
      .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
