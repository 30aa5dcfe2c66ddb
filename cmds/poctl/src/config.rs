//! Configuration file support for poctl
//!
//! Supports `.poctl.yaml` files that can be placed anywhere in the directory
//! hierarchy. poctl searches from the working directory upward to the
//! filesystem root, unless a file is given with `--config`.

use std::{
	fs,
	path::{Path, PathBuf},
	time::Duration,
};

use anyhow::{Context, Result};
use serde::Deserialize;

/// The name of the config file poctl looks for
pub const CONFIG_FILE_NAME: &str = ".poctl.yaml";

/// Root configuration structure for .poctl.yaml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoctlConfig {
	/// Label selectors used to find the ClusterRoleBindings of each workload.
	/// Unset entries keep the Prometheus Operator defaults.
	#[serde(default)]
	pub cluster_role_binding_selectors: BindingSelectors,

	/// Upper bound for one analysis run, in seconds. `--timeout` wins over it.
	#[serde(default)]
	pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingSelectors {
	#[serde(default)]
	pub operator: Option<String>,
	#[serde(default)]
	pub prometheus: Option<String>,
	#[serde(default)]
	pub prometheus_agent: Option<String>,
}

impl PoctlConfig {
	/// Load config by searching from the given directory upward
	pub fn load_from_directory(start_dir: &Path) -> Result<Option<Self>> {
		if let Some(config_path) = find_config_file(start_dir) {
			let config = Self::load_from_file(&config_path)?;
			Ok(Some(config))
		} else {
			Ok(None)
		}
	}

	/// Load config from a specific file path
	pub fn load_from_file(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path)
			.with_context(|| format!("failed to read config file: {}", path.display()))?;
		let config: PoctlConfig = serde_yaml_with_quirks::from_str(&content)
			.with_context(|| format!("failed to parse config file: {}", path.display()))?;
		Ok(config)
	}

	/// Effective timeout: the CLI value if given, otherwise the file value.
	pub fn timeout(&self, cli_seconds: Option<u64>) -> Option<Duration> {
		cli_seconds
			.or(self.timeout_seconds)
			.map(Duration::from_secs)
	}
}

/// Search for a config file starting from `start_dir` and walking up to the filesystem root
pub fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
	let mut current = start_dir.to_path_buf();

	// Canonicalize if possible to handle relative paths
	if let Ok(canonical) = current.canonicalize() {
		current = canonical;
	}

	loop {
		let config_path = current.join(CONFIG_FILE_NAME);
		if config_path.exists() {
			return Some(config_path);
		}

		match current.parent() {
			Some(parent) if parent != current => current = parent.to_path_buf(),
			_ => break,
		}
	}

	None
}
