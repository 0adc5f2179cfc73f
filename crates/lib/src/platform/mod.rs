//! Host platform detection and default directories.
//!
//! Descriptions name the platform they target with a triple such as
//! `x86_64-linux` or `aarch64-darwin`, or with `any` for builders that are
//! portable. A description is only built on a host whose triple matches.

pub mod paths;

use std::fmt;
use std::str::FromStr;

use crate::consts::ANY_PLATFORM;

/// CPU architecture component of a platform triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
  X86_64,
  Aarch64,
}

/// Operating system component of a platform triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
  Linux,
  MacOs,
  Windows,
}

impl Arch {
  fn from_name(name: &str) -> Option<Self> {
    match name {
      "x86_64" => Some(Self::X86_64),
      "aarch64" => Some(Self::Aarch64),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X86_64 => "x86_64",
      Self::Aarch64 => "aarch64",
    }
  }
}

impl Os {
  // Accepts both the `std::env::consts::OS` spelling and the triple spelling.
  fn from_name(name: &str) -> Option<Self> {
    match name {
      "linux" => Some(Self::Linux),
      "macos" | "darwin" => Some(Self::MacOs),
      "windows" => Some(Self::Windows),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Linux => "linux",
      Self::MacOs => "darwin",
      Self::Windows => "windows",
    }
  }
}

/// Platform identifier combining architecture and OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
  pub arch: Arch,
  pub os: Os,
}

impl Platform {
  pub fn new(arch: Arch, os: Os) -> Self {
    Self { arch, os }
  }

  /// Detect the current platform, `None` when the host is not supported.
  pub fn current() -> Option<Self> {
    Some(Self {
      arch: Arch::from_name(std::env::consts::ARCH)?,
      os: Os::from_name(std::env::consts::OS)?,
    })
  }

  pub fn triple(&self) -> String {
    format!("{}-{}", self.arch.as_str(), self.os.as_str())
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.triple())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown platform '{0}' (expected <arch>-<os> or 'any')")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
  type Err = UnknownPlatform;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (arch, os) = s.split_once('-').ok_or_else(|| UnknownPlatform(s.to_string()))?;
    match (Arch::from_name(arch), Os::from_name(os)) {
      (Some(arch), Some(os)) => Ok(Self { arch, os }),
      _ => Err(UnknownPlatform(s.to_string())),
    }
  }
}

/// Returns the platform triple for the current system.
///
/// Unsupported hosts fall back to the raw `std::env::consts` values.
pub fn platform_triple() -> String {
  Platform::current()
    .map(|p| p.triple())
    .unwrap_or_else(|| format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS))
}

/// Checks that a description's platform field is `any` or a known triple.
pub fn validate_target(target: &str) -> Result<(), UnknownPlatform> {
  if target == ANY_PLATFORM {
    return Ok(());
  }
  target.parse::<Platform>().map(|_| ())
}

/// Whether a description targeting `target` may be built on this host.
pub fn can_build(target: &str) -> bool {
  target == ANY_PLATFORM || target == platform_triple()
}
