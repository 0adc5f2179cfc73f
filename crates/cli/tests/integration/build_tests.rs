//! Build command integration tests.

use predicates::prelude::*;

use super::common::{TestEnv, node};

#[test]
fn build_succeeds_and_prints_root_path() {
  let env = TestEnv::from_fixture("hello.json");

  env
    .build(&[])
    .assert()
    .success()
    .stdout(predicate::str::contains("Built: 2"))
    .stdout(predicate::str::contains("hello →"));
}

#[test]
fn build_output_reaches_dependent() {
  let env = TestEnv::from_fixture("hello.json");

  let (code, json) = env.build_json(&[]);
  assert_eq!(code, Some(0));
  assert_eq!(json["success"], true);

  let hello = node(&json, "hello");
  assert_eq!(hello["status"], "built");
  let path = std::path::PathBuf::from(hello["path"].as_str().unwrap());
  assert_eq!(std::fs::read_to_string(path.join("hello")).unwrap(), "hello world\n");
}

#[test]
fn second_build_is_fully_cached() {
  let env = TestEnv::from_fixture("hello.json");

  env.build(&[]).assert().success();

  let (code, json) = env.build_json(&[]);
  assert_eq!(code, Some(0));
  assert_eq!(json["invocations"], 0);
  assert_eq!(node(&json, "greeting")["status"], "cached");
  assert_eq!(node(&json, "hello")["status"], "cached");
}

#[test]
fn explicit_store_flag_wins_over_env() {
  let env = TestEnv::from_fixture("hello.json");
  let other = env.temp.path().join("other-store");

  env
    .build(&["--store"])
    .arg(&other)
    .assert()
    .success();

  assert!(other.join("obj").is_dir());
  assert_eq!(std::fs::read_dir(env.store_path().join("obj")).map(|d| d.count()).unwrap_or(0), 0);
}

#[test]
fn failed_node_exits_one_and_names_log() {
  let env = TestEnv::from_fixture("failing.json");

  env
    .build(&["--root", "app", "--root", "docs"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("builder exited with status 3"))
    .stderr(predicate::str::contains("app: skipped, dependency broken failed"));
}

#[test]
fn failure_does_not_stop_unrelated_roots() {
  let env = TestEnv::from_fixture("failing.json");

  let (code, json) = env.build_json(&["--root", "app", "--root", "docs"]);
  assert_eq!(code, Some(1));
  assert_eq!(json["success"], false);

  let broken = node(&json, "broken");
  assert_eq!(broken["status"], "failed");
  let log = std::fs::read_to_string(broken["log"].as_str().unwrap()).unwrap();
  assert!(log.contains("compiler exploded"));

  assert_eq!(node(&json, "app")["status"], "skipped");
  assert_eq!(node(&json, "app")["failed_dependency"], "broken");
  assert_eq!(node(&json, "docs")["status"], "built");
}

#[test]
fn cycle_exits_two() {
  let env = TestEnv::from_fixture("cycle.json");

  env
    .build(&[])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("cycl"));
}

#[test]
fn unknown_root_exits_two() {
  let env = TestEnv::from_fixture("hello.json");

  env
    .build(&["--root", "nope"])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("nope"));
}

#[test]
fn source_change_triggers_rebuild() {
  let env = TestEnv::from_fixture("source.json");
  env.write_file("message.txt", "first\n");

  let (_, first) = env.build_json(&[]);
  assert_eq!(node(&first, "copy")["status"], "built");

  env.write_file("message.txt", "second\n");
  let (code, second) = env.build_json(&[]);
  assert_eq!(code, Some(0));

  let copy = node(&second, "copy");
  assert_eq!(copy["status"], "built");
  assert_ne!(copy["address"], node(&first, "copy")["address"]);
  let path = std::path::PathBuf::from(copy["path"].as_str().unwrap());
  assert_eq!(std::fs::read_to_string(path.join("copy")).unwrap(), "second\n");
}

#[test]
fn missing_source_exits_two() {
  let env = TestEnv::from_fixture("source.json");

  env.build(&[]).assert().code(2);
}

#[test]
fn timeout_cancels_running_builder() {
  let env = TestEnv::from_fixture("hello.json");
  env.write_file(
    "cairn.json",
    r#"{ "root": "spin", "builds": [ { "name": "spin", "builder": "/bin/sh", "args": ["-c", "while :; do :; done"] } ] }"#,
  );

  env
    .build(&["--timeout", "300ms"])
    .timeout(std::time::Duration::from_secs(30))
    .assert()
    .code(2)
    .stderr(predicate::str::contains("cancelled"));
}

#[test]
fn invalid_timeout_is_rejected() {
  let env = TestEnv::from_fixture("hello.json");

  env.build(&["--timeout", "soon"]).assert().failure();
}
