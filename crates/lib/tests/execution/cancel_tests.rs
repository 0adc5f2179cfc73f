//! Cancellation of in-flight builds.

use std::time::{Duration, Instant};

use cairn_lib::execute::{BuildEventKind, ExecuteConfig, ExecuteError, execute_until};
use tokio::sync::mpsc;

use super::common::*;

/// Whether `pid` is still running. A zombie awaiting its reaper counts as gone.
#[cfg(target_os = "linux")]
fn is_running(pid: u32) -> bool {
  let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
    return false;
  };
  let state = stat.rsplit_once(')').and_then(|(_, rest)| rest.trim_start().chars().next());
  !matches!(state, Some('Z') | Some('X'))
}

#[cfg(target_os = "linux")]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_kills_builders_and_leaves_nothing_sealed() {
  let env = TestEnv::new();
  let spin = sh("spin", "echo $$ > \"$out/pid\"; while :; do :; done").with_output("never");
  let graph = env.resolve(vec![spin], &["spin"]);
  let address = graph.roots()[0].clone();
  let pid_file = env.store.entry_path(&address).join("pid");

  let (tx, mut rx) = mpsc::unbounded_channel();
  let config = ExecuteConfig {
    events: Some(tx),
    ..config()
  };
  let watched = pid_file.clone();
  let cancel = async move {
    while let Some(event) = rx.recv().await {
      if event.kind == BuildEventKind::Started {
        break;
      }
    }
    while !std::fs::read_to_string(&watched).is_ok_and(|pid| pid.ends_with('\n')) {
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
  };

  let started = Instant::now();
  let err = execute_until(&graph, &env.store, &config, cancel).await.unwrap_err();

  assert!(matches!(err, ExecuteError::Cancelled));
  assert!(started.elapsed() < Duration::from_secs(30));

  let pid: u32 = read(&pid_file).trim().parse().unwrap();
  let deadline = Instant::now() + Duration::from_secs(5);
  while is_running(pid) && Instant::now() < deadline {
    tokio::time::sleep(Duration::from_millis(20)).await;
  }
  assert!(!is_running(pid), "builder {pid} survived cancellation");

  assert!(!env.store.has(&address));
  assert!(env.store.entry_path(&address).exists());

  // Whatever the killed builder left behind is cleared under the lock.
  let lock = env.store.lock(&address).unwrap();
  env.store.clear_partial(&lock).unwrap();
  assert!(!env.store.entry_path(&address).exists());
}

#[tokio::test]
async fn completed_cancel_future_aborts_immediately() {
  let env = TestEnv::new();
  let graph = env.resolve(vec![sh("spin", "while :; do :; done")], &["spin"]);

  let result = execute_until(&graph, &env.store, &config(), async {
    tokio::time::sleep(Duration::from_millis(200)).await;
  })
  .await;

  assert!(matches!(result, Err(ExecuteError::Cancelled)));
}
