mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{cmd_build, cmd_info, cmd_plan};
use output::{OutputFormat, print_error};

/// Exit status for malformed graphs and fatal errors.
const EXIT_FATAL: u8 = 2;

/// cairn - content-addressed build orchestrator
#[derive(Parser)]
#[command(name = "cairn")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Increase log output (-v for info, -vv for debug)
  #[arg(short, long, global = true, action = ArgAction::Count)]
  verbose: u8,

  /// Store directory [default: $CAIRN_STORE, else the user data directory]
  #[arg(long, global = true, value_name = "DIR")]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build the roots of a manifest, reusing everything already in the store
  Build(BuildArgs),

  /// Show what a build would do without running anything
  Plan(PlanArgs),

  /// Show version, platform and store information
  Info {
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },
}

#[derive(Args)]
pub struct BuildArgs {
  /// Path to the JSON manifest
  pub manifest: PathBuf,

  /// Description to build (repeatable) [default: the manifest's root]
  #[arg(short, long = "root", value_name = "NAME")]
  pub roots: Vec<String>,

  /// Maximum number of builders running at once [default: number of CPUs]
  #[arg(short, long)]
  pub jobs: Option<usize>,

  /// Re-hash cached entries and fail on any mismatch
  #[arg(long)]
  pub verify: bool,

  /// Extra attempts when a builder fails to start
  #[arg(long, default_value_t = 0)]
  pub retries: u32,

  /// Cancel the build after this long (e.g. "90s", "10m")
  #[arg(long, value_parser = humantime::parse_duration)]
  pub timeout: Option<Duration>,

  #[arg(short, long, value_enum, default_value_t)]
  pub output: OutputFormat,
}

#[derive(Args)]
pub struct PlanArgs {
  /// Path to the JSON manifest
  pub manifest: PathBuf,

  /// Description to plan (repeatable) [default: the manifest's root]
  #[arg(short, long = "root", value_name = "NAME")]
  pub roots: Vec<String>,

  #[arg(short, long, value_enum, default_value_t)]
  pub output: OutputFormat,
}

fn init_tracing(verbose: u8) {
  let default = match verbose {
    0 => "warn",
    1 => "info",
    _ => "debug",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let store = cli.store.as_deref();
  let result = match cli.command {
    Commands::Build(args) => cmd_build(&args, store),
    Commands::Plan(args) => cmd_plan(&args, store),
    Commands::Info { output } => cmd_info(output, store),
  };

  match result {
    Ok(code) => code,
    Err(e) => {
      print_error(&format!("{:#}", e));
      ExitCode::from(EXIT_FATAL)
    }
  }
}
