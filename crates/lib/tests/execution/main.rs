//! Execution tests against a real store with `/bin/sh` builders.

#![cfg(unix)]

mod cache_tests;
mod cancel_tests;
mod compile_tests;
mod failure_tests;
mod ordering_tests;
