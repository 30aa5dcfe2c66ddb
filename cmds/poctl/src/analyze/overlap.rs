//! Detection of monitors that scrape the same target twice.
//!
//! Every (workload, port) pair selected by a ServiceMonitor or PodMonitor is a
//! scrape target. When more than one monitor of the same type selects a
//! target, Prometheus ingests the same series twice.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::ResourceExt;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

use super::{
	rbac::render_lines,
	report::error_chain,
	selector::{to_query, SelectorError, SelectorState},
	AnalysisTarget, AnalyzeError, Analyzer,
};
use crate::k8s::{
	crds::{PodMonitor, ServiceMonitor, ServiceMonitorEndpoint},
	AccessError, ClusterState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MonitorKind {
	ServiceMonitor,
	PodMonitor,
}

impl MonitorKind {
	fn plural(self) -> &'static str {
		match self {
			Self::ServiceMonitor => "ServiceMonitors",
			Self::PodMonitor => "PodMonitors",
		}
	}

	/// What the monitor's selector is matched against.
	fn workloads(self) -> &'static str {
		match self {
			Self::ServiceMonitor => "services",
			Self::PodMonitor => "pods",
		}
	}
}

impl fmt::Display for MonitorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::ServiceMonitor => f.write_str("ServiceMonitor"),
			Self::PodMonitor => f.write_str("PodMonitor"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OverlapFinding {
	/// Two or more monitors select the same target.
	#[serde(rename_all = "camelCase")]
	Duplicate {
		monitor_kind: MonitorKind,
		key: String,
		monitors: Vec<String>,
	},
	/// A monitor whose selector could not be turned into a query.
	#[serde(rename_all = "camelCase")]
	InvalidSelector {
		monitor_kind: MonitorKind,
		monitor: String,
		namespace: String,
		reason: String,
	},
	/// The workloads a monitor selects could not be listed.
	#[serde(rename_all = "camelCase")]
	ListFailed {
		monitor_kind: MonitorKind,
		monitor: String,
		namespace: String,
		reason: String,
	},
}

impl fmt::Display for OverlapFinding {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Duplicate {
				monitor_kind,
				key,
				monitors,
			} => write!(
				f,
				"Overlapping {} found for {key}: [{}]",
				monitor_kind.plural(),
				monitors.join(", ")
			),
			Self::InvalidSelector {
				monitor_kind,
				monitor,
				namespace,
				reason,
			} => write!(
				f,
				"{monitor_kind} {monitor} in namespace {namespace} has an invalid selector: {reason}"
			),
			Self::ListFailed {
				monitor_kind,
				monitor,
				namespace,
				reason,
			} => write!(
				f,
				"error listing {} for {monitor_kind} {namespace}/{monitor}: {reason}",
				monitor_kind.workloads()
			),
		}
	}
}

/// Every overlap found in a namespace, reported together.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{}", render_lines(.findings))]
pub struct OverlapFindings {
	pub namespace: String,
	pub findings: Vec<OverlapFinding>,
}

/// Scrape targets keyed by `<namespace>/<workload>:<port>`, each with the
/// monitors selecting it.
#[derive(Debug, Default)]
struct TargetIndex {
	targets: BTreeMap<String, Vec<String>>,
}

impl TargetIndex {
	fn insert(&mut self, monitor: &str, keys: BTreeSet<String>) {
		for key in keys {
			self.targets.entry(key).or_default().push(monitor.to_string());
		}
	}

	fn into_findings(self, monitor_kind: MonitorKind) -> impl Iterator<Item = OverlapFinding> {
		self.targets
			.into_iter()
			.filter(|(_, monitors)| monitors.len() > 1)
			.map(move |(key, monitors)| OverlapFinding::Duplicate {
				monitor_kind,
				key,
				monitors,
			})
	}
}

/// A monitor's selector as an optional list query. Monitors without criteria
/// select every workload in the namespace.
fn monitor_query(selector: Option<&LabelSelector>) -> Result<Option<String>, SelectorError> {
	match SelectorState::of(selector) {
		SelectorState::Criteria(selector) => to_query(selector).map(Some),
		SelectorState::Absent | SelectorState::Empty => Ok(None),
	}
}

/// Service port numbers referenced by the endpoints. An endpoint without a
/// port name references every port of the Service.
fn service_ports(service: &Service, endpoints: &[ServiceMonitorEndpoint]) -> BTreeSet<String> {
	let ports = service
		.spec
		.as_ref()
		.and_then(|spec| spec.ports.as_deref())
		.unwrap_or_default();

	endpoints
		.iter()
		.flat_map(|endpoint| {
			ports.iter().filter(move |port| match endpoint.port.as_deref() {
				Some(name) if !name.is_empty() => port.name.as_deref() == Some(name),
				_ => true,
			})
		})
		.map(|port| port.port.to_string())
		.collect()
}

/// Scan ServiceMonitors, then PodMonitors, of `namespace` for overlapping
/// targets.
///
/// Failing to list the monitors themselves aborts the scan. Problems with a
/// single monitor (a malformed selector, a failed workload list) are collected
/// for that monitor and returned together with the overlaps.
#[instrument(skip(state))]
pub async fn detect_overlaps(state: &ClusterState, namespace: &str) -> Result<(), AnalyzeError> {
	let mut findings = Vec::new();

	let service_monitors = state.list::<ServiceMonitor>(namespace, None).await?;
	let mut services = TargetIndex::default();
	for monitor in &service_monitors {
		let name = monitor.name_any();
		let query = match monitor_query(monitor.spec.selector.as_ref()) {
			Ok(query) => query,
			Err(err) => {
				findings.push(invalid_selector(MonitorKind::ServiceMonitor, &name, namespace, &err));
				continue;
			}
		};

		let matched = match state.list::<Service>(namespace, query.as_deref()).await {
			Ok(matched) => matched,
			Err(err) => {
				findings.push(list_failed(MonitorKind::ServiceMonitor, &name, namespace, &err));
				continue;
			}
		};
		let keys = matched
			.iter()
			.flat_map(|service| {
				let service_name = service.name_any();
				service_ports(service, &monitor.spec.endpoints)
					.into_iter()
					.map(move |port| format!("{namespace}/{service_name}:{port}"))
			})
			.collect();
		services.insert(&name, keys);
	}

	let pod_monitors = state.list::<PodMonitor>(namespace, None).await?;
	let mut pods = TargetIndex::default();
	for monitor in &pod_monitors {
		let name = monitor.name_any();
		let query = match monitor_query(monitor.spec.selector.as_ref()) {
			Ok(query) => query,
			Err(err) => {
				findings.push(invalid_selector(MonitorKind::PodMonitor, &name, namespace, &err));
				continue;
			}
		};

		let matched = match state.list::<Pod>(namespace, query.as_deref()).await {
			Ok(matched) => matched,
			Err(err) => {
				findings.push(list_failed(MonitorKind::PodMonitor, &name, namespace, &err));
				continue;
			}
		};
		let ports: Vec<String> = monitor
			.spec
			.pod_metrics_endpoints
			.iter()
			.filter_map(|endpoint| endpoint.target_port())
			.collect();
		let keys = matched
			.iter()
			.flat_map(|pod| {
				let pod_name = pod.name_any();
				ports
					.iter()
					.map(move |port| format!("{namespace}/{pod_name}:{port}"))
			})
			.collect();
		pods.insert(&name, keys);
	}

	findings.extend(services.into_findings(MonitorKind::ServiceMonitor));
	findings.extend(pods.into_findings(MonitorKind::PodMonitor));

	debug!(
		service_monitors = service_monitors.len(),
		pod_monitors = pod_monitors.len(),
		findings = findings.len(),
		"overlap scan finished"
	);

	if findings.is_empty() {
		Ok(())
	} else {
		Err(OverlapFindings {
			namespace: namespace.to_string(),
			findings,
		}
		.into())
	}
}

fn invalid_selector(
	monitor_kind: MonitorKind,
	monitor: &str,
	namespace: &str,
	err: &SelectorError,
) -> OverlapFinding {
	OverlapFinding::InvalidSelector {
		monitor_kind,
		monitor: monitor.to_string(),
		namespace: namespace.to_string(),
		reason: err.to_string(),
	}
}

fn list_failed(
	monitor_kind: MonitorKind,
	monitor: &str,
	namespace: &str,
	err: &AccessError,
) -> OverlapFinding {
	OverlapFinding::ListFailed {
		monitor_kind,
		monitor: monitor.to_string(),
		namespace: namespace.to_string(),
		reason: error_chain(err),
	}
}

/// Runs the overlap scan over the target's namespace.
pub struct OverlapAnalyzer;

impl Analyzer for OverlapAnalyzer {
	async fn analyze(
		&self,
		state: &ClusterState,
		target: &AnalysisTarget,
	) -> Result<(), AnalyzeError> {
		detect_overlaps(state, &target.namespace).await?;
		info!(
			namespace = %target.namespace,
			"no overlapping monitors found, namespace is compliant"
		);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use k8s_openapi::api::core::v1::{ServicePort, ServiceSpec};
	use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

	use super::*;

	fn service(name: &str, ports: &[(&str, i32)]) -> Service {
		Service {
			metadata: ObjectMeta {
				name: Some(name.to_string()),
				..Default::default()
			},
			spec: Some(ServiceSpec {
				ports: Some(
					ports
						.iter()
						.map(|(name, port)| ServicePort {
							name: Some(name.to_string()),
							port: *port,
							..Default::default()
						})
						.collect(),
				),
				..Default::default()
			}),
			..Default::default()
		}
	}

	fn endpoint(port: Option<&str>) -> ServiceMonitorEndpoint {
		ServiceMonitorEndpoint {
			port: port.map(str::to_string),
		}
	}

	#[test]
	fn test_service_ports_by_name() {
		let svc = service("web", &[("http", 80), ("metrics", 9090)]);

		let ports = service_ports(&svc, &[endpoint(Some("metrics"))]);
		assert_eq!(ports, BTreeSet::from(["9090".to_string()]));

		let ports = service_ports(&svc, &[endpoint(Some("grpc"))]);
		assert!(ports.is_empty());
	}

	#[test]
	fn test_unnamed_endpoint_references_every_port() {
		let svc = service("web", &[("http", 80), ("metrics", 9090)]);

		let ports = service_ports(&svc, &[endpoint(None)]);
		assert_eq!(ports, BTreeSet::from(["80".to_string(), "9090".to_string()]));
	}

	#[test]
	fn test_target_index_reports_shared_keys_in_order() {
		let mut index = TargetIndex::default();
		index.insert(
			"b-monitor",
			BTreeSet::from(["ns/svc2:80".to_string(), "ns/svc1:80".to_string()]),
		);
		index.insert("a-monitor", BTreeSet::from(["ns/svc1:80".to_string()]));
		index.insert("c-monitor", BTreeSet::from(["ns/svc2:80".to_string()]));

		let findings: Vec<String> = index
			.into_findings(MonitorKind::ServiceMonitor)
			.map(|f| f.to_string())
			.collect();

		assert_eq!(
			findings,
			vec![
				"Overlapping ServiceMonitors found for ns/svc1:80: [b-monitor, a-monitor]",
				"Overlapping ServiceMonitors found for ns/svc2:80: [b-monitor, c-monitor]",
			]
		);
	}

	#[test]
	fn test_single_monitor_per_target_is_not_an_overlap() {
		let mut index = TargetIndex::default();
		index.insert("only", BTreeSet::from(["ns/pod:metrics".to_string()]));

		assert_eq!(index.into_findings(MonitorKind::PodMonitor).count(), 0);
	}

	#[test]
	fn test_list_failure_names_the_monitor() {
		let finding = OverlapFinding::ListFailed {
			monitor_kind: MonitorKind::PodMonitor,
			monitor: "web".to_string(),
			namespace: "test".to_string(),
			reason: "failed to list Pod in namespace test".to_string(),
		};

		assert_eq!(
			finding.to_string(),
			"error listing pods for PodMonitor test/web: failed to list Pod in namespace test"
		);
	}

	#[test]
	fn test_monitor_without_criteria_selects_everything() {
		assert_eq!(monitor_query(None).unwrap(), None);
		assert_eq!(monitor_query(Some(&LabelSelector::default())).unwrap(), None);
	}
}
