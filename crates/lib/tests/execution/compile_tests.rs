//! The canonical example: compile a C program from a local source.

use std::path::Path;

use cairn_lib::graph::ExecutionGraph;

use super::common::*;

const MANIFEST: &str = r#"{
  "root": "app",
  "builds": [
    {
      "name": "app",
      "builder": "/usr/bin/cc",
      "args": ["-o", "$${out}/app", "$${input:src}"],
      "env": { "PATH": "/usr/bin:/bin" },
      "inputs": { "src": { "path": "main.c" } },
      "outputs": ["app"]
    }
  ]
}"#;

#[tokio::test]
async fn compiles_once_then_hits_cache() {
  if !Path::new("/usr/bin/cc").exists() {
    eprintln!("skipping: /usr/bin/cc not available");
    return;
  }

  let env = TestEnv::new();
  env.write("main.c", "int main(void) { return 0; }\n");
  let manifest = env.manifest(MANIFEST);
  let roots = manifest.roots(&[]).unwrap();
  let graph = ExecutionGraph::resolve(&manifest, &roots, &env.store).unwrap();

  let first = env.run(&graph).await;
  assert!(first.is_success(), "{:?}", first.failed);
  assert_eq!(first.invocations(), 1);

  let address = &graph.roots()[0];
  let binary = env.store.entry_path(address).join("app");
  assert!(binary.is_file());
  assert!(std::process::Command::new(&binary).status().unwrap().success());

  let second = env.run(&graph).await;
  assert_eq!(second.invocations(), 0);
  assert_eq!(second.cached.len(), 1);
}
