//! Dependency ordering, observed through the event channel.

use cairn_lib::description::InputRef;
use cairn_lib::execute::{BuildEvent, BuildEventKind, ExecuteConfig};
use tokio::sync::mpsc;

use super::common::*;

fn position(events: &[BuildEvent], name: &str, kind: &BuildEventKind) -> usize {
  events
    .iter()
    .position(|e| e.name == name && &e.kind == kind)
    .unwrap_or_else(|| panic!("no {kind:?} event for {name}"))
}

#[tokio::test]
async fn dependencies_finish_before_dependents_start() {
  let env = TestEnv::new();
  let builds = vec![
    sh_write("base", "b"),
    sh_write("left", "l").with_input("base", InputRef::build("base")),
    sh_write("right", "r").with_input("base", InputRef::build("base")),
    sh_write("app", "a")
      .with_input("left", InputRef::build("left"))
      .with_input("right", InputRef::build("right")),
  ];
  let graph = env.resolve(builds, &["app"]);

  let (tx, mut rx) = mpsc::unbounded_channel();
  let config = ExecuteConfig {
    events: Some(tx),
    ..config()
  };
  let report = env.try_run(&graph, &config).await.unwrap();
  drop(config);
  assert!(report.is_success());

  let mut events = Vec::new();
  while let Some(event) = rx.recv().await {
    events.push(event);
  }

  for (dependency, dependent) in [("base", "left"), ("base", "right"), ("left", "app"), ("right", "app")] {
    let finished = position(&events, dependency, &BuildEventKind::Finished);
    let started = position(&events, dependent, &BuildEventKind::Started);
    assert!(finished < started, "{dependency} must finish before {dependent} starts");
    assert!(events[finished].at <= events[started].at);

    let dep_entry = report.entry(&address_of(&graph, dependency)).unwrap();
    assert!(dep_entry.path.join(".cairn-complete").exists());
  }
}

#[tokio::test]
async fn cached_nodes_report_cached_events() {
  let env = TestEnv::new();
  let graph = env.resolve(vec![sh_write("one", "1")], &["one"]);
  env.run(&graph).await;

  let (tx, mut rx) = mpsc::unbounded_channel();
  let config = ExecuteConfig {
    events: Some(tx),
    ..config()
  };
  env.try_run(&graph, &config).await.unwrap();
  drop(config);

  let event = rx.recv().await.unwrap();
  assert_eq!(event.kind, BuildEventKind::Cached);
  assert_eq!(event.name, "one");
  assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn single_slot_still_completes_everything() {
  let env = TestEnv::new();
  let builds = vec![
    sh_write("a", "a"),
    sh_write("b", "b"),
    sh_write("c", "c")
      .with_input("a", InputRef::build("a"))
      .with_input("b", InputRef::build("b")),
  ];
  let graph = env.resolve(builds, &["c"]);
  let config = ExecuteConfig {
    parallelism: 1,
    ..config()
  };

  let report = env.try_run(&graph, &config).await.unwrap();

  assert!(report.is_success());
  assert_eq!(report.realized.len(), 3);
}
