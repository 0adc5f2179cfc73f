//! cairn-lib: Core types and logic for cairn
//!
//! This crate provides the orchestration core of a content-addressed build tool:
//! - `BuildDescription`: immutable recipes naming a builder, its arguments,
//!   environment and explicitly enumerated inputs
//! - `Manifest`: a set of descriptions loaded from JSON
//! - `ExecutionGraph`: the DAG of descriptions reachable from the requested roots
//! - `ContentStore`: sealed, immutable build outputs keyed by content address
//! - `execute`: runs the graph, skipping everything already in the store

pub mod consts;
pub mod description;
pub mod execute;
pub mod graph;
pub mod manifest;
pub mod materialize;
pub mod placeholder;
pub mod platform;
pub mod store;
pub mod util;
