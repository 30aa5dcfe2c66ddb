//! Prometheus Operator custom resources.
//!
//! Only the fields read by the analyzers are modelled; everything else in the
//! objects returned by the API server is ignored during deserialization.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// API group shared by every Prometheus Operator resource.
pub const MONITORING_GROUP: &str = "monitoring.coreos.com";

/// Service account Kubernetes assigns to pods that don't name one.
pub const DEFAULT_SERVICE_ACCOUNT: &str = "default";

fn service_account_or_default(name: Option<&str>) -> &str {
	name.filter(|name| !name.is_empty())
		.unwrap_or(DEFAULT_SERVICE_ACCOUNT)
}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default)]
#[kube(
	group = "monitoring.coreos.com",
	version = "v1",
	kind = "Prometheus",
	plural = "prometheuses",
	namespaced,
	schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusSpec {
	pub service_account_name: Option<String>,
	pub service_monitor_selector: Option<LabelSelector>,
	pub service_monitor_namespace_selector: Option<LabelSelector>,
	pub pod_monitor_selector: Option<LabelSelector>,
	pub pod_monitor_namespace_selector: Option<LabelSelector>,
	pub probe_selector: Option<LabelSelector>,
	pub probe_namespace_selector: Option<LabelSelector>,
	pub scrape_config_selector: Option<LabelSelector>,
	pub scrape_config_namespace_selector: Option<LabelSelector>,
	pub rule_selector: Option<LabelSelector>,
	pub rule_namespace_selector: Option<LabelSelector>,
}

impl PrometheusSpec {
	pub fn service_account(&self) -> &str {
		service_account_or_default(self.service_account_name.as_deref())
	}
}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default)]
#[kube(
	group = "monitoring.coreos.com",
	version = "v1alpha1",
	kind = "PrometheusAgent",
	plural = "prometheusagents",
	namespaced,
	schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusAgentSpec {
	pub service_account_name: Option<String>,
	pub service_monitor_selector: Option<LabelSelector>,
	pub service_monitor_namespace_selector: Option<LabelSelector>,
	pub pod_monitor_selector: Option<LabelSelector>,
	pub pod_monitor_namespace_selector: Option<LabelSelector>,
	pub probe_selector: Option<LabelSelector>,
	pub probe_namespace_selector: Option<LabelSelector>,
	pub scrape_config_selector: Option<LabelSelector>,
	pub scrape_config_namespace_selector: Option<LabelSelector>,
}

impl PrometheusAgentSpec {
	pub fn service_account(&self) -> &str {
		service_account_or_default(self.service_account_name.as_deref())
	}
}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default)]
#[kube(
	group = "monitoring.coreos.com",
	version = "v1",
	kind = "Alertmanager",
	plural = "alertmanagers",
	namespaced,
	schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerSpec {
	pub service_account_name: Option<String>,
	/// User-provided Secret holding `alertmanager.yaml`.
	pub config_secret: Option<String>,
	pub alertmanager_config_selector: Option<LabelSelector>,
	pub alertmanager_config_namespace_selector: Option<LabelSelector>,
	pub alertmanager_configuration: Option<AlertmanagerConfiguration>,
}

impl AlertmanagerSpec {
	pub fn service_account(&self) -> &str {
		service_account_or_default(self.service_account_name.as_deref())
	}
}

/// Reference to an AlertmanagerConfig used as the global configuration.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerConfiguration {
	pub name: Option<String>,
}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default)]
#[kube(
	group = "monitoring.coreos.com",
	version = "v1",
	kind = "ServiceMonitor",
	plural = "servicemonitors",
	namespaced,
	schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMonitorSpec {
	pub selector: Option<LabelSelector>,
	#[serde(default)]
	pub endpoints: Vec<ServiceMonitorEndpoint>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMonitorEndpoint {
	/// Name of the Service port to scrape.
	pub port: Option<String>,
}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default)]
#[kube(
	group = "monitoring.coreos.com",
	version = "v1",
	kind = "PodMonitor",
	plural = "podmonitors",
	namespaced,
	schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct PodMonitorSpec {
	pub selector: Option<LabelSelector>,
	#[serde(default)]
	pub pod_metrics_endpoints: Vec<PodMetricsEndpoint>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct PodMetricsEndpoint {
	/// Name of the container port to scrape.
	pub port: Option<String>,
	pub port_number: Option<i32>,
}

impl PodMetricsEndpoint {
	/// Port identifier used when keying scrape targets.
	pub fn target_port(&self) -> Option<String> {
		self.port
			.clone()
			.filter(|port| !port.is_empty())
			.or_else(|| self.port_number.map(|number| number.to_string()))
	}
}

// The remaining kinds are only ever counted by label selector, so their specs
// stay opaque.

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default)]
#[kube(
	group = "monitoring.coreos.com",
	version = "v1",
	kind = "Probe",
	plural = "probes",
	namespaced,
	schema = "disabled"
)]
pub struct ProbeSpec {}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default)]
#[kube(
	group = "monitoring.coreos.com",
	version = "v1alpha1",
	kind = "ScrapeConfig",
	plural = "scrapeconfigs",
	namespaced,
	schema = "disabled"
)]
pub struct ScrapeConfigSpec {}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default)]
#[kube(
	group = "monitoring.coreos.com",
	version = "v1",
	kind = "PrometheusRule",
	plural = "prometheusrules",
	namespaced,
	schema = "disabled"
)]
pub struct PrometheusRuleSpec {}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default)]
#[kube(
	group = "monitoring.coreos.com",
	version = "v1alpha1",
	kind = "AlertmanagerConfig",
	plural = "alertmanagerconfigs",
	namespaced,
	schema = "disabled"
)]
pub struct AlertmanagerConfigSpec {}
