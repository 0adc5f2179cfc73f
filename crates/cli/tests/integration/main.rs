//! CLI integration tests. Builders are `/bin/sh` scripts.
#![cfg(unix)]

mod build_tests;
mod common;
