//! Kubernetes cluster connection management.

use std::{path::Path, time::Duration};

use k8s_openapi::apimachinery::pkg::version::Info;
use kube::{
	config::{InferConfigError, KubeConfigOptions, Kubeconfig, KubeconfigError},
	Client, Config,
};
use thiserror::Error;
use tracing::instrument;

use super::state::ClusterState;

/// Default timeout for Kubernetes API requests.
const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur when connecting to a Kubernetes cluster.
#[derive(Debug, Error)]
pub enum ConnectionError {
	#[error("no context named `{0}` was found. Please check your $KUBECONFIG")]
	ContextNotFound(String),

	#[error("kubeconfig has no current-context set and no --context was given")]
	NoCurrentContext,

	#[error(transparent)]
	Kubeconfig(#[from] KubeconfigError),

	#[error(transparent)]
	Infer(#[from] InferConfigError),

	#[error(transparent)]
	Kube(#[from] kube::Error),
}

/// Represents a connection to a Kubernetes cluster.
///
/// This type encapsulates the kube client and server metadata. Analyzers
/// never see it directly; they work against the [`ClusterState`] it hands out.
#[derive(Clone)]
pub struct ClusterConnection {
	client: Client,
	server_version: Info,
	/// Human-readable identifier for the cluster (context name or API server URL).
	cluster_identifier: String,
}

impl std::fmt::Debug for ClusterConnection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ClusterConnection")
			.field("cluster_identifier", &self.cluster_identifier)
			.field("server_version", &self.server_version)
			.finish_non_exhaustive()
	}
}

impl ClusterConnection {
	/// Connect to a cluster.
	///
	/// - `kubeconfig`: explicit kubeconfig file to read instead of `$KUBECONFIG`
	/// - `context`: kubeconfig context to use instead of the current one
	///
	/// With neither set, the configuration is inferred the same way kubectl
	/// does it (kubeconfig first, then in-cluster service account).
	#[instrument(skip_all)]
	pub async fn connect(
		kubeconfig: Option<&Path>,
		context: Option<&str>,
	) -> Result<Self, ConnectionError> {
		match (kubeconfig, context) {
			(Some(path), context) => {
				let kubeconfig = Kubeconfig::read_from(path)?;
				Self::from_kubeconfig(kubeconfig, context).await
			}
			(None, Some(context)) => {
				let kubeconfig = Kubeconfig::read()?;
				Self::from_kubeconfig(kubeconfig, Some(context)).await
			}
			(None, None) => {
				let config = Config::infer().await?;
				let cluster_identifier = config.cluster_url.to_string();
				Self::from_config(config, cluster_identifier).await
			}
		}
	}

	/// Connect to a cluster using an already loaded kubeconfig.
	#[instrument(skip_all)]
	pub async fn from_kubeconfig(
		kubeconfig: Kubeconfig,
		context: Option<&str>,
	) -> Result<Self, ConnectionError> {
		let context_name = match context {
			Some(name) => name.to_string(),
			None => kubeconfig
				.current_context
				.clone()
				.ok_or(ConnectionError::NoCurrentContext)?,
		};

		if !kubeconfig.contexts.iter().any(|c| c.name == context_name) {
			return Err(ConnectionError::ContextNotFound(context_name));
		}

		tracing::debug!(context = %context_name, "using kubeconfig context");

		let config = Config::from_custom_kubeconfig(
			kubeconfig,
			&KubeConfigOptions {
				context: Some(context_name.clone()),
				..Default::default()
			},
		)
		.await?;

		Self::from_config(config, format!("context:{}", context_name)).await
	}

	async fn from_config(
		mut config: Config,
		cluster_identifier: String,
	) -> Result<Self, ConnectionError> {
		config.read_timeout = Some(DEFAULT_API_TIMEOUT);
		let client = Client::try_from(config)?;

		// Fail early on unreachable clusters, before any analysis starts
		let server_version = client.apiserver_version().await?;

		tracing::debug!(
			cluster = %cluster_identifier,
			version = %server_version.git_version,
			"connected to cluster"
		);

		Ok(Self {
			client,
			server_version,
			cluster_identifier,
		})
	}

	/// Get the server version.
	pub fn server_version(&self) -> &Info {
		&self.server_version
	}

	/// Get the cluster identifier (context name or API server URL).
	pub fn cluster_identifier(&self) -> &str {
		&self.cluster_identifier
	}

	/// Read-only view over the cluster used by the analyzers.
	pub fn state(&self) -> ClusterState {
		ClusterState::new(self.client.clone())
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use indoc::indoc;

	use super::*;

	#[tokio::test]
	async fn test_connect_context_not_found() {
		let kubeconfig = Kubeconfig::default();

		let result = ClusterConnection::from_kubeconfig(kubeconfig, Some("nonexistent")).await;
		assert_matches!(
			result,
			Err(ConnectionError::ContextNotFound(context)) if context == "nonexistent"
		);
	}

	#[tokio::test]
	async fn test_connect_without_current_context_errors() {
		let kubeconfig = Kubeconfig::from_yaml(indoc! {"
			apiVersion: v1
			kind: Config
			clusters:
			- name: staging
			  cluster:
			    server: https://staging.example.com
			contexts:
			- name: staging
			  context:
			    cluster: staging
		"})
		.unwrap();

		let result = ClusterConnection::from_kubeconfig(kubeconfig, None).await;
		assert_matches!(result, Err(ConnectionError::NoCurrentContext));
	}

	#[tokio::test]
	async fn test_connect_current_context_missing_from_contexts() {
		let kubeconfig = Kubeconfig {
			current_context: Some("gone".to_string()),
			..Default::default()
		};

		let result = ClusterConnection::from_kubeconfig(kubeconfig, None).await;
		assert_matches!(
			result,
			Err(ConnectionError::ContextNotFound(context)) if context == "gone"
		);
	}
}
