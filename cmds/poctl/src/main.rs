use std::process::ExitCode;

use clap::{Parser, Subcommand};
use poctl::{
	commands,
	commands::util::BrokenPipeGuard,
	telemetry::{self, LogFormat},
};
use tracing::Level;

#[cfg(all(
	target_os = "linux",
	feature = "mimalloc",
	not(feature = "system-alloc")
))]
#[global_allocator]
static GLOBAL: mimallocator::Mimalloc = mimallocator::Mimalloc;

#[derive(Parser)]
#[command(name = "poctl")]
#[command(about = "Command line tool for Prometheus Operator resources", long_about = None)]
#[command(version = env!("POCTL_VERSION"))]
struct Cli {
	#[command(subcommand)]
	command: Commands,

	/// Log level (trace, debug, info, warn, error). Defaults to $RUST_LOG, then info
	#[arg(long, global = true)]
	log_level: Option<Level>,

	/// Log output format
	#[arg(long, global = true, value_enum, default_value_t)]
	log_format: LogFormat,
}

#[derive(Subcommand)]
enum Commands {
	/// Check that Prometheus Operator resources are consistent with the cluster
	Analyze(commands::analyze::AnalyzeArgs),
}

fn main() -> ExitCode {
	let cli = Cli::parse();

	let _telemetry = match telemetry::init(cli.log_level, cli.log_format) {
		Ok(guard) => guard,
		Err(err) => {
			eprintln!("Error: failed to initialize logging: {err:#}");
			return ExitCode::FAILURE;
		}
	};

	let stdout = BrokenPipeGuard::new(std::io::stdout());

	let result = match cli.command {
		Commands::Analyze(args) => commands::analyze::run(args, stdout),
	};

	match result {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			eprintln!("Error: {err:#}");
			ExitCode::FAILURE
		}
	}
}
