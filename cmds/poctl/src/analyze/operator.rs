use k8s_openapi::api::{
	apps::v1::Deployment,
	rbac::v1::{ClusterRole, ClusterRoleBinding},
};
use tracing::{debug, info, instrument};

use super::{rbac, AnalysisTarget, AnalyzeError, Analyzer};
use crate::k8s::{crds::DEFAULT_SERVICE_ACCOUNT, ClusterState};

/// Checks the operator Deployment can manage every monitoring CRD.
#[derive(Debug, Clone)]
pub struct OperatorAnalyzer {
	binding_selector: String,
}

impl OperatorAnalyzer {
	pub fn new(binding_selector: impl Into<String>) -> Self {
		Self {
			binding_selector: binding_selector.into(),
		}
	}
}

fn pod_service_account(deployment: &Deployment) -> &str {
	deployment
		.spec
		.as_ref()
		.and_then(|spec| spec.template.spec.as_ref())
		.and_then(|pod| pod.service_account_name.as_deref())
		.filter(|name| !name.is_empty())
		.unwrap_or(DEFAULT_SERVICE_ACCOUNT)
}

impl Analyzer for OperatorAnalyzer {
	#[instrument(skip_all, fields(name = %target.name, namespace = %target.namespace))]
	async fn analyze(
		&self,
		state: &ClusterState,
		target: &AnalysisTarget,
	) -> Result<(), AnalyzeError> {
		let deployment: Deployment = state.get(&target.name, &target.namespace).await?;
		let service_account = pod_service_account(&deployment);

		let bindings = state
			.list_cluster::<ClusterRoleBinding>(Some(&self.binding_selector))
			.await?;
		rbac::ensure_service_account_bound(&bindings, service_account)?;

		for binding in &bindings {
			let role_name = &binding.role_ref.name;
			let role: ClusterRole = state.get_cluster(role_name).await?;
			rbac::verify_crd_coverage(state, role_name, &role).await?;
			debug!(role = %role_name, "ClusterRole covers every monitoring CRD");
		}

		info!("Prometheus Operator is compliant, no issues found");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use k8s_openapi::api::{
		apps::v1::DeploymentSpec,
		core::v1::{PodSpec, PodTemplateSpec},
	};

	use super::*;

	fn deployment(service_account: Option<&str>) -> Deployment {
		Deployment {
			spec: Some(DeploymentSpec {
				template: PodTemplateSpec {
					spec: Some(PodSpec {
						service_account_name: service_account.map(str::to_string),
						..Default::default()
					}),
					..Default::default()
				},
				..Default::default()
			}),
			..Default::default()
		}
	}

	#[test]
	fn test_pod_service_account() {
		assert_eq!(
			pod_service_account(&deployment(Some("prometheus-operator"))),
			"prometheus-operator"
		);
		assert_eq!(pod_service_account(&deployment(None)), "default");
		assert_eq!(pod_service_account(&deployment(Some(""))), "default");
		assert_eq!(pod_service_account(&Deployment::default()), "default");
	}
}
