//! Analyze command handler.

use std::{io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use tracing::{info, warn};

use crate::{
	analyze::{self, report::AnalysisReport, AnalysisTarget, AnalyzeConfig, AnalyzeError, AnalyzerSettings},
	config::PoctlConfig,
	k8s::ClusterConnection,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
	/// Compliant line, or the error on stderr
	#[default]
	Text,
	/// Report object on stdout
	Json,
}

#[derive(Args)]
pub struct AnalyzeArgs {
	/// The kind of object to analyze (operator, prometheus, alertmanager, prometheusagent, servicemonitor, overlapping)
	#[arg(short = 'k', long)]
	pub kind: String,

	/// The name of the object to analyze
	#[arg(short = 'n', long)]
	pub name: String,

	/// The namespace of the object to analyze
	#[arg(short = 's', long)]
	pub namespace: String,

	/// Path to the kubeconfig file to use instead of $KUBECONFIG
	#[arg(long)]
	pub kubeconfig: Option<PathBuf>,

	/// Kubeconfig context to use instead of the current one
	#[arg(long)]
	pub context: Option<String>,

	/// Path to a config file. Defaults to the nearest .poctl.yaml
	#[arg(long)]
	pub config: Option<PathBuf>,

	/// Abort the analysis after this many seconds
	#[arg(long)]
	pub timeout: Option<u64>,

	/// Output format
	#[arg(short = 'o', long, value_enum, default_value_t)]
	pub output: OutputFormat,
}

fn load_config(path: Option<&PathBuf>) -> Result<PoctlConfig> {
	match path {
		Some(path) => PoctlConfig::load_from_file(path),
		None => {
			let cwd = std::env::current_dir().context("resolving current directory")?;
			Ok(PoctlConfig::load_from_directory(&cwd)?.unwrap_or_default())
		}
	}
}

/// Build the immutable configuration of one run from the CLI and config file.
///
/// Fails on invalid arguments before any cluster connection is made.
pub fn build_config(args: &AnalyzeArgs, file: &PoctlConfig) -> Result<AnalyzeConfig, AnalyzeError> {
	Ok(AnalyzeConfig {
		target: AnalysisTarget::parse(&args.kind, &args.name, &args.namespace)?,
		settings: AnalyzerSettings::from_config(file),
		timeout: file.timeout(args.timeout),
	})
}

pub fn run<W: Write>(args: AnalyzeArgs, writer: W) -> Result<()> {
	let file_config = load_config(args.config.as_ref())?;
	let config = build_config(&args, &file_config)?;

	let runtime = tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
		.context("creating tokio runtime")?;

	runtime.block_on(run_async(args, config, writer))
}

async fn run_async<W: Write>(args: AnalyzeArgs, config: AnalyzeConfig, mut writer: W) -> Result<()> {
	let connection = ClusterConnection::connect(args.kubeconfig.as_deref(), args.context.as_deref())
		.await
		.context("connecting to cluster")?;

	info!(
		cluster = %connection.cluster_identifier(),
		kind = %config.target.kind,
		name = %config.target.name,
		namespace = %config.target.namespace,
		"starting analysis"
	);

	let state = connection.state();
	let result = tokio::select! {
		result = analyze::run(&state, &config) => result,
		_ = tokio::signal::ctrl_c() => {
			warn!("interrupted, aborting analysis");
			Err(AnalyzeError::Cancelled)
		}
	};

	let report = AnalysisReport::new(&config.target, &result);
	match args.output {
		OutputFormat::Json => {
			serde_json::to_writer_pretty(&mut writer, &report).context("writing report")?;
			writeln!(writer)?;
		}
		OutputFormat::Text if report.compliant => {
			writeln!(writer, "{}", report.summary())?;
		}
		OutputFormat::Text => {}
	}
	writer.flush()?;

	result.map_err(anyhow::Error::from)
}
