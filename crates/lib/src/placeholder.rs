//! Placeholder parsing and substitution for references inside descriptions.
//!
//! Builder paths, arguments, environment values and the working directory of a
//! [`BuildDescription`](crate::description::BuildDescription) may refer to
//! paths that only exist once dependencies are in the store. Such references
//! are written as placeholders and substituted textually right before the
//! builder is spawned.
//!
//! # Placeholder Formats
//!
//! - `$${out}` - the output directory of the description being built
//! - `$${input:NAME}` - the store path of the input named `NAME`
//! - `$${script}` - the file holding the description's inline script
//!
//! # Shell Variables
//!
//! Single `$` characters pass through unchanged, so `$HOME` or `$1` inside an
//! inline script reach the shell untouched.
//!
//! # Escaping
//!
//! `$$${` produces a literal `$${`.
//!
//! # Example
//!
//! ```
//! use cairn_lib::placeholder::{parse, Placeholder, Segment};
//!
//! let segments = parse("$${input:cc}/bin/cc").unwrap();
//! assert_eq!(segments, vec![
//!     Segment::Placeholder(Placeholder::Input("cc".to_string())),
//!     Segment::Literal("/bin/cc".to_string()),
//! ]);
//! ```

use thiserror::Error;

const OPEN: &str = "$${";
const ESCAPED_OPEN: &str = "$$${";

/// A parsed placeholder reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Placeholder {
  /// `$${out}`
  Out,
  /// `$${input:NAME}`
  Input(String),
  /// `$${script}`
  Script,
}

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  Literal(String),
  Placeholder(Placeholder),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
  #[error("unclosed placeholder at byte {0}")]
  Unclosed(usize),

  #[error("unknown placeholder type: {0}")]
  UnknownType(String),

  #[error("malformed placeholder: {0}")]
  Malformed(String),

  #[error("input '{0}' has no materialized path")]
  UnresolvedInput(String),

  #[error("description has no script")]
  NoScript,
}

/// Supplies the values placeholders stand for.
pub trait Resolver {
  fn resolve_out(&self) -> Result<&str, PlaceholderError>;

  fn resolve_input(&self, name: &str) -> Result<&str, PlaceholderError>;

  fn resolve_script(&self) -> Result<&str, PlaceholderError>;
}

/// Parse a string containing placeholders into segments.
pub fn parse(input: &str) -> Result<Vec<Segment>, PlaceholderError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut rest = input;

  while let Some(pos) = rest.find('$') {
    literal.push_str(&rest[..pos]);
    let tail = &rest[pos..];

    if let Some(after) = tail.strip_prefix(ESCAPED_OPEN) {
      literal.push_str(OPEN);
      rest = after;
    } else if let Some(after) = tail.strip_prefix(OPEN) {
      let offset = input.len() - tail.len();
      let close = after.find('}').ok_or(PlaceholderError::Unclosed(offset))?;

      if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(&mut literal)));
      }
      segments.push(Segment::Placeholder(parse_body(&after[..close])?));
      rest = &after[close + 1..];
    } else {
      // Not a placeholder opener: shell syntax, keep the `$` as is.
      literal.push('$');
      rest = &tail[1..];
    }
  }

  literal.push_str(rest);
  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

fn parse_body(body: &str) -> Result<Placeholder, PlaceholderError> {
  match body {
    "out" => return Ok(Placeholder::Out),
    "script" => return Ok(Placeholder::Script),
    _ => {}
  }

  let (kind, name) = body
    .split_once(':')
    .ok_or_else(|| PlaceholderError::UnknownType(body.to_string()))?;

  match kind {
    "input" if !name.is_empty() && !name.contains(':') => Ok(Placeholder::Input(name.to_string())),
    "input" => Err(PlaceholderError::Malformed(format!("bad input name in '{body}'"))),
    _ => Err(PlaceholderError::UnknownType(kind.to_string())),
  }
}

/// All placeholders referenced by `input`, in order of appearance.
pub fn references(input: &str) -> Result<Vec<Placeholder>, PlaceholderError> {
  Ok(
    parse(input)?
      .into_iter()
      .filter_map(|segment| match segment {
        Segment::Placeholder(p) => Some(p),
        Segment::Literal(_) => None,
      })
      .collect(),
  )
}

/// Substitute all placeholders in a string using the provided resolver.
pub fn substitute(input: &str, resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let mut result = String::with_capacity(input.len());

  for segment in parse(input)? {
    match segment {
      Segment::Literal(text) => result.push_str(&text),
      Segment::Placeholder(Placeholder::Out) => result.push_str(resolver.resolve_out()?),
      Segment::Placeholder(Placeholder::Input(name)) => result.push_str(resolver.resolve_input(&name)?),
      Segment::Placeholder(Placeholder::Script) => result.push_str(resolver.resolve_script()?),
    }
  }

  Ok(result)
}
