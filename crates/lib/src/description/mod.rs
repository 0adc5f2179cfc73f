//! Build descriptions.
//!
//! A [`BuildDescription`] is the immutable recipe for one store entry: which
//! builder to run, with which arguments and environment, on which inputs.
//! Descriptions are identified by the [`ContentAddress`] of their normalized
//! form ([`ResolvedDescription`]), in which every input has been replaced by
//! the address or content hash it resolves to. Two descriptions that agree on
//! every field and on every resolved input share an address; any difference
//! produces a new one.
//!
//! [`ContentAddress`]: crate::util::hash::ContentAddress

mod types;
mod validate;

pub use types::*;
pub use validate::DescriptionError;
