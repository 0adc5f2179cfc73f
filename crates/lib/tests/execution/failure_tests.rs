//! Partial failure and graph errors.

use std::collections::BTreeMap;

use cairn_lib::description::InputRef;
use cairn_lib::execute::ExecuteError;
use cairn_lib::graph::{ExecutionGraph, GraphError};
use cairn_lib::manifest::Manifest;

use super::common::*;

#[tokio::test]
async fn failed_subtree_does_not_stop_siblings() {
  let env = TestEnv::new();
  let builds = vec![
    sh("broken", "echo 'compiler exploded' >&2; exit 1"),
    sh_write("needs-broken", "x").with_input("dep", InputRef::build("broken")),
    sh_write("healthy", "fine"),
    sh_write("needs-healthy", "also-fine").with_input("dep", InputRef::build("healthy")),
  ];
  let graph = env.resolve(builds, &["needs-broken", "needs-healthy"]);

  let report = env.run(&graph).await;

  let broken = address_of(&graph, "broken");
  assert!(!report.is_success());
  assert_eq!(report.failed.len(), 1);

  let Some(ExecuteError::BuildFailed { status, log, .. }) = report.failed.get(&broken) else {
    panic!("expected BuildFailed, got {:?}", report.failed);
  };
  assert_eq!(*status, Some(1));
  assert!(read(log).contains("compiler exploded"));

  assert_eq!(
    report.skipped,
    BTreeMap::from([(address_of(&graph, "needs-broken"), broken.clone())])
  );
  for name in ["healthy", "needs-healthy"] {
    let address = address_of(&graph, name);
    assert!(report.realized.contains_key(&address), "{name} should be built");
    assert!(env.store.has(&address));
  }
  assert!(!env.store.has(&broken));
}

#[tokio::test]
async fn failed_node_is_retried_on_next_request() {
  let env = TestEnv::new();
  let graph = env.resolve(vec![sh("flaky", "exit 3")], &["flaky"]);

  let first = env.run(&graph).await;
  let second = env.run(&graph).await;

  assert_eq!(first.invocations(), 1);
  assert_eq!(second.invocations(), 1);
  assert!(matches!(
    second.failed.values().next(),
    Some(ExecuteError::BuildFailed { status: Some(3), .. })
  ));
}

#[tokio::test]
async fn cycles_fail_before_any_builder_runs() {
  let env = TestEnv::new();
  let marker = env.project().join("ran");
  let touch = format!("echo ran > {}", marker.display());

  let builds = vec![
    sh("entry", &touch).with_input("a", InputRef::build("a")),
    sh("a", &touch).with_input("b", InputRef::build("b")),
    sh("b", &touch).with_input("a", InputRef::build("a")),
    sh("solo", &touch).with_input("me", InputRef::build("solo")),
  ];
  let manifest = Manifest::new(builds).unwrap();

  for root in ["entry", "solo"] {
    let err = ExecutionGraph::resolve(&manifest, &[root], &env.store).unwrap_err();
    assert!(matches!(err, GraphError::CyclicDependency { .. }), "{root}: {err}");
  }
  assert!(!marker.exists());
}

#[test]
fn unresolved_references_are_reported_by_name() {
  let env = TestEnv::new();
  let manifest = env.manifest(
    r#"{ "builds": [ { "name": "app", "builder": "/bin/sh", "inputs": { "src": { "path": "missing.c" } } } ] }"#,
  );

  let err = ExecutionGraph::resolve(&manifest, &["app"], &env.store).unwrap_err();
  assert!(matches!(
    err,
    GraphError::UnresolvedReference { from, reference } if from == "app" && reference.ends_with("missing.c")
  ));
}
