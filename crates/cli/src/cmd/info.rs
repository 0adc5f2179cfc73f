use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use serde::Serialize;

use cairn_lib::consts::STORE_ENV;
use cairn_lib::platform::{Platform, paths::store_dir, platform_triple};

use crate::output::{OutputFormat, print_json, print_stat, print_warning};

#[derive(Debug, Serialize)]
struct Info {
  version: &'static str,
  platform: String,
  supported: bool,
  store: String,
  store_exists: bool,
}

pub fn cmd_info(output: OutputFormat, store: Option<&Path>) -> Result<ExitCode> {
  let store = store.map(Path::to_path_buf).unwrap_or_else(store_dir);
  let info = Info {
    version: env!("CARGO_PKG_VERSION"),
    platform: platform_triple(),
    supported: Platform::current().is_some(),
    store_exists: store.is_dir(),
    store: store.display().to_string(),
  };

  if output.is_json() {
    print_json(&info)?;
    return Ok(ExitCode::SUCCESS);
  }

  println!("cairn {}", info.version);
  print_stat("Platform", &info.platform);
  print_stat("Store", &info.store);
  if !info.supported {
    print_warning("Unrecognized host platform; only descriptions targeting 'any' can be built");
  }
  if !info.store_exists {
    print_warning(&format!("Store does not exist yet (set {} or --store to change it)", STORE_ENV));
  }

  Ok(ExitCode::SUCCESS)
}
