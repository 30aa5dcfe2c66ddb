use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use kube::ResourceExt;
use tracing::{debug, info, instrument};

use super::{
	selector::resolve_namespace_selector, AnalysisTarget, AnalyzeError, Analyzer,
};
use crate::k8s::{crds::Alertmanager, ClusterState};

/// Key holding the configuration in a user-provided Secret.
pub const USER_CONFIG_KEY: &str = "alertmanager.yaml";
/// Key holding the configuration in the Secret the operator generates.
pub const GENERATED_CONFIG_KEY: &str = "alertmanager.yaml.gz";

/// Checks an Alertmanager's service account, configuration Secret and
/// AlertmanagerConfig namespace selector.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertmanagerAnalyzer;

impl Analyzer for AlertmanagerAnalyzer {
	#[instrument(skip_all, fields(name = %target.name, namespace = %target.namespace))]
	async fn analyze(
		&self,
		state: &ClusterState,
		target: &AnalysisTarget,
	) -> Result<(), AnalyzeError> {
		let alertmanager: Alertmanager = state.get(&target.name, &target.namespace).await?;
		let spec = &alertmanager.spec;

		state
			.get::<ServiceAccount>(spec.service_account(), &target.namespace)
			.await?;

		// With neither set, the whole configuration comes from a Secret.
		if spec.alertmanager_config_selector.is_none() && spec.alertmanager_configuration.is_none() {
			let (secret, key) = match spec.config_secret.as_deref().filter(|s| !s.is_empty()) {
				Some(name) => (name.to_string(), USER_CONFIG_KEY),
				None => (
					format!("alertmanager-{}-generated", alertmanager.name_any()),
					GENERATED_CONFIG_KEY,
				),
			};
			check_config_secret(state, &secret, &target.namespace, key).await?;
		}

		if let Some(selector) = spec.alertmanager_config_namespace_selector.as_ref() {
			resolve_namespace_selector(state, Some(selector))
				.await
				.map_err(|source| AnalyzeError::Selector {
					field: "alertmanagerConfigNamespaceSelector",
					source,
				})?;
		}

		info!("Alertmanager is compliant, no issues found");
		Ok(())
	}
}

async fn check_config_secret(
	state: &ClusterState,
	name: &str,
	namespace: &str,
	key: &str,
) -> Result<(), AnalyzeError> {
	let secret: Secret = state.get(name, namespace).await?;

	let Some(data) = secret.data.as_ref().filter(|data| !data.is_empty()) else {
		return Err(AnalyzeError::EmptySecret(name.to_string()));
	};

	if !data.contains_key(key) {
		return Err(AnalyzeError::MissingSecretKey {
			key: key.to_string(),
			secret: name.to_string(),
		});
	}

	debug!(secret = %name, key = %key, "configuration Secret found");
	Ok(())
}
