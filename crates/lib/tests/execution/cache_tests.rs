//! Addressing and cache-hit behaviour.

use cairn_lib::description::InputRef;
use cairn_lib::graph::ExecutionGraph;

use super::common::*;

const APP: &str = r#"{
  "root": "app",
  "builds": [
    {
      "name": "app",
      "builder": "/bin/sh",
      "args": ["-c", "read line < \"$${input:src}\"; echo \"$line\" > \"$out/app\""],
      "inputs": { "src": { "path": "main.txt" } },
      "outputs": ["app"]
    }
  ]
}"#;

// Same description: different key order and formatting.
const APP_REORDERED: &str = r#"{"builds":[{"outputs":["app"],"inputs":{"src":{"path":"main.txt"}},
  "args":["-c","read line < \"$${input:src}\"; echo \"$line\" > \"$out/app\""],"builder":"/bin/sh","name":"app"}],
  "root":"app"}"#;

fn root_address(env: &TestEnv, json: &str) -> cairn_lib::util::hash::ContentAddress {
  let manifest = env.manifest(json);
  let roots = manifest.roots(&[]).unwrap();
  let graph = ExecutionGraph::resolve(&manifest, &roots, &env.store).unwrap();
  graph.roots()[0].clone()
}

#[test]
fn structurally_equal_descriptions_share_address() {
  let env = TestEnv::new();
  env.write("main.txt", "hello\n");

  let a = root_address(&env, APP);
  let b = root_address(&env, APP_REORDERED);
  assert_eq!(a, b);

  let changed = APP.replace("\"outputs\": [\"app\"]", "\"outputs\": [\"app\", \"app\"]");
  assert_ne!(root_address(&env, &changed), a);
}

#[tokio::test]
async fn renamed_duplicate_is_built_once() {
  let env = TestEnv::new();
  let same = |name: &str| sh(name, "echo shared > \"$out/value\"");
  let builds = vec![
    same("first"),
    same("second"),
    sh_write("root", "r")
      .with_input("a", InputRef::build("first"))
      .with_input("b", InputRef::build("second")),
  ];
  let graph = env.resolve(builds, &["root"]);

  let report = env.run(&graph).await;

  assert!(report.is_success(), "{:?}", report.failed);
  assert_eq!(graph.len(), 2);
  assert_eq!(report.invocations(), 2);
  assert!(env.store.has(&address_of(&graph, "first")));
}

#[tokio::test]
async fn second_build_invokes_nothing() {
  let env = TestEnv::new();
  env.write("main.txt", "hello\n");
  let manifest = env.manifest(APP);
  let graph = ExecutionGraph::resolve(&manifest, &["app"], &env.store).unwrap();

  let first = env.run(&graph).await;
  assert!(first.is_success());
  assert_eq!(first.invocations(), 1);

  let entry = first.entry(&graph.roots()[0]).unwrap();
  assert_eq!(read(&entry.path.join("app")), "hello\n");
  assert_eq!(entry.outputs, vec![entry.path.join("app")]);

  let second = env.run(&graph).await;
  assert!(second.is_success());
  assert_eq!(second.invocations(), 0);
  assert_eq!(second.entry(&graph.roots()[0]), Some(entry));
}

#[tokio::test]
async fn source_change_builds_new_entry() {
  let env = TestEnv::new();
  env.write("main.txt", "one\n");
  let manifest = env.manifest(APP);
  let before = ExecutionGraph::resolve(&manifest, &["app"], &env.store).unwrap();
  env.run(&before).await;

  env.write("main.txt", "two\n");
  let after = ExecutionGraph::resolve(&manifest, &["app"], &env.store).unwrap();
  assert_ne!(before.roots(), after.roots());

  let report = env.run(&after).await;
  assert_eq!(report.invocations(), 1);
  assert_eq!(read(&report.entry(&after.roots()[0]).unwrap().path.join("app")), "two\n");

  // The old entry is untouched.
  let old = env.store.get(&before.roots()[0]).unwrap();
  assert_eq!(read(&old.path.join("app")), "one\n");
}

#[tokio::test]
async fn concurrent_identical_requests_build_once() {
  let env = TestEnv::new();
  let graph = env.resolve(vec![sh_write("shared", "once")], &["shared"]);

  let (a, b) = tokio::join!(env.run(&graph), env.run(&graph));

  assert!(a.is_success() && b.is_success());
  assert_eq!(a.invocations() + b.invocations(), 1);
}

#[tokio::test]
async fn store_input_consumes_existing_entry() {
  let env = TestEnv::new();
  let lib_graph = env.resolve(vec![sh_write("lib", "libfoo")], &["lib"]);
  env.run(&lib_graph).await;
  let lib = lib_graph.roots()[0].clone();

  let app = sh("app", "read line < \"$${input:lib}/lib\"; echo \"$line+app\" > \"$out/app\"")
    .with_input("lib", InputRef::store(lib))
    .with_output("app");
  let graph = env.resolve(vec![app], &["app"]);
  assert_eq!(graph.len(), 1);

  let report = env.run(&graph).await;
  assert_eq!(report.invocations(), 1);
  assert_eq!(read(&report.entry(&graph.roots()[0]).unwrap().path.join("app")), "libfoo+app\n");
}
