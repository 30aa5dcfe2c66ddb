use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use tracing::{info, instrument};

use super::{
	rbac,
	selector::{check_label_selectors, check_namespace_selectors, MonitoringResource},
	AnalysisTarget, AnalyzeError, Analyzer,
};
use crate::k8s::{crds::Prometheus, ClusterState};

/// Checks a Prometheus server: RBAC of its service account, then every
/// namespace and resource selector.
#[derive(Debug, Clone)]
pub struct PrometheusAnalyzer {
	binding_selector: String,
}

impl PrometheusAnalyzer {
	pub fn new(binding_selector: impl Into<String>) -> Self {
		Self {
			binding_selector: binding_selector.into(),
		}
	}
}

impl Analyzer for PrometheusAnalyzer {
	#[instrument(skip_all, fields(name = %target.name, namespace = %target.namespace))]
	async fn analyze(
		&self,
		state: &ClusterState,
		target: &AnalysisTarget,
	) -> Result<(), AnalyzeError> {
		let prometheus: Prometheus = state.get(&target.name, &target.namespace).await?;
		let spec = &prometheus.spec;

		let bindings = state
			.list_cluster::<ClusterRoleBinding>(Some(&self.binding_selector))
			.await?;
		rbac::ensure_service_account_bound(&bindings, spec.service_account())?;
		rbac::verify_bound_roles(state, &bindings).await?;

		check_namespace_selectors(
			state,
			&[
				(
					"podMonitorNamespaceSelector",
					spec.pod_monitor_namespace_selector.as_ref(),
				),
				("probeNamespaceSelector", spec.probe_namespace_selector.as_ref()),
				(
					"serviceMonitorNamespaceSelector",
					spec.service_monitor_namespace_selector.as_ref(),
				),
				(
					"scrapeConfigNamespaceSelector",
					spec.scrape_config_namespace_selector.as_ref(),
				),
				("ruleNamespaceSelector", spec.rule_namespace_selector.as_ref()),
			],
		)
		.await?;

		check_label_selectors(
			state,
			&target.namespace,
			&[
				(
					"serviceMonitorSelector",
					spec.service_monitor_selector.as_ref(),
					MonitoringResource::ServiceMonitor,
				),
				(
					"podMonitorSelector",
					spec.pod_monitor_selector.as_ref(),
					MonitoringResource::PodMonitor,
				),
				(
					"probeSelector",
					spec.probe_selector.as_ref(),
					MonitoringResource::Probe,
				),
				(
					"scrapeConfigSelector",
					spec.scrape_config_selector.as_ref(),
					MonitoringResource::ScrapeConfig,
				),
				(
					"ruleSelector",
					spec.rule_selector.as_ref(),
					MonitoringResource::PrometheusRule,
				),
			],
		)
		.await?;

		info!("Prometheus is compliant, no issues found");
		Ok(())
	}
}
