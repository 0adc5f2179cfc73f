//! Build manifests.
//!
//! A manifest is the set of descriptions a build request draws from, loaded
//! from a JSON file, together with the default root to build.

mod types;

pub use types::*;
