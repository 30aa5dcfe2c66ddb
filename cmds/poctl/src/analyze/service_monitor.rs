use k8s_openapi::api::core::v1::Service;
use tracing::{debug, info, instrument};

use super::{
	selector::{to_query, SelectorState},
	AnalysisTarget, AnalyzeError, Analyzer,
};
use crate::k8s::{crds::ServiceMonitor, ClusterState};

/// Checks that a ServiceMonitor selects Services exposing its endpoint ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceMonitorAnalyzer;

fn exposes_port(service: &Service, port: &str) -> bool {
	service
		.spec
		.as_ref()
		.and_then(|spec| spec.ports.as_ref())
		.is_some_and(|ports| ports.iter().any(|p| p.name.as_deref() == Some(port)))
}

impl Analyzer for ServiceMonitorAnalyzer {
	#[instrument(skip_all, fields(name = %target.name, namespace = %target.namespace))]
	async fn analyze(
		&self,
		state: &ClusterState,
		target: &AnalysisTarget,
	) -> Result<(), AnalyzeError> {
		let monitor: ServiceMonitor = state.get(&target.name, &target.namespace).await?;

		// Absent and empty selectors are both rejected here.
		let SelectorState::Criteria(selector) = SelectorState::of(monitor.spec.selector.as_ref())
		else {
			return Err(AnalyzeError::MissingSelector {
				name: target.name.clone(),
				namespace: target.namespace.clone(),
			});
		};

		let query = to_query(selector).map_err(|source| AnalyzeError::InvalidSelector {
			name: target.name.clone(),
			namespace: target.namespace.clone(),
			source,
		})?;

		let services = state
			.list::<Service>(&target.namespace, Some(&query))
			.await?;
		if services.is_empty() {
			return Err(AnalyzeError::NoMatchingServices {
				name: target.name.clone(),
				namespace: target.namespace.clone(),
			});
		}

		for endpoint in &monitor.spec.endpoints {
			let Some(port) = endpoint.port.as_deref().filter(|p| !p.is_empty()) else {
				debug!("endpoint has no port name, skipping port check");
				continue;
			};

			if !services.iter().any(|service| exposes_port(service, port)) {
				return Err(AnalyzeError::MissingServicePort {
					name: target.name.clone(),
					namespace: target.namespace.clone(),
					port: port.to_string(),
				});
			}
		}

		info!("ServiceMonitor is compliant, no issues found");
		Ok(())
	}
}
