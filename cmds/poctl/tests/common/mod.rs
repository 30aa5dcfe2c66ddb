//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use k8s_mock::{HttpMockK8sServer, MockFailure, RunningHttpMockK8sServer};
use poctl::k8s::{ClusterConnection, ClusterState};
use serde_json::{json, Value};

pub const MONITORING_V1: &str = "monitoring.coreos.com/v1";
pub const MONITORING_V1ALPHA1: &str = "monitoring.coreos.com/v1alpha1";

pub async fn cluster(resources: Vec<Value>) -> (RunningHttpMockK8sServer, ClusterState) {
	cluster_with_failures(resources, vec![]).await
}

pub async fn cluster_with_failures(
	resources: Vec<Value>,
	failures: Vec<MockFailure>,
) -> (RunningHttpMockK8sServer, ClusterState) {
	let server = HttpMockK8sServer::builder()
		.resources(resources)
		.failures(failures)
		.build()
		.start()
		.await;

	let connection = ClusterConnection::from_kubeconfig(server.kubeconfig(), None)
		.await
		.expect("connection should succeed");
	let state = connection.state();

	(server, state)
}

pub fn namespace(name: &str, labels: Value) -> Value {
	json!({
		"apiVersion": "v1",
		"kind": "Namespace",
		"metadata": {"name": name, "labels": labels}
	})
}

pub fn service(namespace: &str, name: &str, labels: Value, ports: &[(&str, i32)]) -> Value {
	let ports: Vec<Value> = ports
		.iter()
		.map(|(port_name, port)| json!({"name": port_name, "port": port}))
		.collect();
	json!({
		"apiVersion": "v1",
		"kind": "Service",
		"metadata": {"name": name, "namespace": namespace, "labels": labels},
		"spec": {"ports": ports}
	})
}

pub fn pod(namespace: &str, name: &str, labels: Value) -> Value {
	json!({
		"apiVersion": "v1",
		"kind": "Pod",
		"metadata": {"name": name, "namespace": namespace, "labels": labels}
	})
}

pub fn service_account(namespace: &str, name: &str) -> Value {
	json!({
		"apiVersion": "v1",
		"kind": "ServiceAccount",
		"metadata": {"name": name, "namespace": namespace}
	})
}

/// Secret with the given keys, each holding a small base64 payload.
pub fn secret(namespace: &str, name: &str, keys: &[&str]) -> Value {
	let data: serde_json::Map<String, Value> = keys
		.iter()
		.map(|key| (key.to_string(), json!("Z2xvYmFsOiB7fQ==")))
		.collect();
	json!({
		"apiVersion": "v1",
		"kind": "Secret",
		"metadata": {"name": name, "namespace": namespace},
		"data": data
	})
}

pub fn deployment(namespace: &str, name: &str, service_account: &str) -> Value {
	json!({
		"apiVersion": "apps/v1",
		"kind": "Deployment",
		"metadata": {"name": name, "namespace": namespace},
		"spec": {
			"selector": {"matchLabels": {"app.kubernetes.io/name": name}},
			"template": {
				"metadata": {"labels": {"app.kubernetes.io/name": name}},
				"spec": {
					"serviceAccountName": service_account,
					"containers": [{"name": name, "image": "quay.io/prometheus-operator/prometheus-operator"}]
				}
			}
		}
	})
}

pub fn cluster_role(name: &str, rules: Value) -> Value {
	json!({
		"apiVersion": "rbac.authorization.k8s.io/v1",
		"kind": "ClusterRole",
		"metadata": {"name": name},
		"rules": rules
	})
}

/// Binding of `role` to the service account `namespace/service_account`.
pub fn cluster_role_binding(
	name: &str,
	labels: Value,
	role: &str,
	namespace: &str,
	service_account: &str,
) -> Value {
	json!({
		"apiVersion": "rbac.authorization.k8s.io/v1",
		"kind": "ClusterRoleBinding",
		"metadata": {"name": name, "labels": labels},
		"roleRef": {
			"apiGroup": "rbac.authorization.k8s.io",
			"kind": "ClusterRole",
			"name": role
		},
		"subjects": [{
			"kind": "ServiceAccount",
			"name": service_account,
			"namespace": namespace
		}]
	})
}

/// Rules granting everything a Prometheus server needs.
pub fn prometheus_rules() -> Value {
	json!([
		{
			"apiGroups": [""],
			"resources": ["services", "endpoints", "pods", "nodes"],
			"verbs": ["get", "list", "watch"]
		},
		{
			"apiGroups": ["discovery.k8s.io"],
			"resources": ["endpointslices"],
			"verbs": ["get", "list", "watch"]
		},
		{
			"apiGroups": [""],
			"resources": ["configmaps"],
			"verbs": ["get"]
		},
		{
			"nonResourceURLs": ["/metrics"],
			"verbs": ["get"]
		}
	])
}

pub const CRD_NAMES: [(&str, &str, &str); 10] = [
	("alertmanagers", "alertmanager", "Alertmanager"),
	("alertmanagerconfigs", "alertmanagerconfig", "AlertmanagerConfig"),
	("podmonitors", "podmonitor", "PodMonitor"),
	("probes", "probe", "Probe"),
	("prometheusagents", "prometheusagent", "PrometheusAgent"),
	("prometheuses", "prometheus", "Prometheus"),
	("prometheusrules", "prometheusrule", "PrometheusRule"),
	("scrapeconfigs", "scrapeconfig", "ScrapeConfig"),
	("servicemonitors", "servicemonitor", "ServiceMonitor"),
	("thanosrulers", "thanosruler", "ThanosRuler"),
];

pub fn crd(plural: &str, singular: &str, kind: &str) -> Value {
	json!({
		"apiVersion": "apiextensions.k8s.io/v1",
		"kind": "CustomResourceDefinition",
		"metadata": {"name": format!("{plural}.monitoring.coreos.com")},
		"spec": {
			"group": "monitoring.coreos.com",
			"names": {"plural": plural, "singular": singular, "kind": kind},
			"scope": "Namespaced",
			"versions": []
		}
	})
}

/// Every monitoring CRD the operator manages.
pub fn monitoring_crds() -> Vec<Value> {
	CRD_NAMES
		.iter()
		.map(|(plural, singular, kind)| crd(plural, singular, kind))
		.collect()
}

/// A monitoring custom resource with an arbitrary spec.
pub fn monitoring_object(
	api_version: &str,
	kind: &str,
	namespace: &str,
	name: &str,
	labels: Value,
	spec: Value,
) -> Value {
	json!({
		"apiVersion": api_version,
		"kind": kind,
		"metadata": {"name": name, "namespace": namespace, "labels": labels},
		"spec": spec
	})
}

pub fn prometheus(namespace: &str, name: &str, spec: Value) -> Value {
	monitoring_object(MONITORING_V1, "Prometheus", namespace, name, json!({}), spec)
}

pub fn prometheus_agent(namespace: &str, name: &str, spec: Value) -> Value {
	monitoring_object(
		MONITORING_V1ALPHA1,
		"PrometheusAgent",
		namespace,
		name,
		json!({}),
		spec,
	)
}

pub fn alertmanager(namespace: &str, name: &str, spec: Value) -> Value {
	monitoring_object(MONITORING_V1, "Alertmanager", namespace, name, json!({}), spec)
}

pub fn service_monitor(namespace: &str, name: &str, selector: Value, ports: &[&str]) -> Value {
	let endpoints: Vec<Value> = ports.iter().map(|port| json!({"port": port})).collect();
	let mut spec = json!({"endpoints": endpoints});
	if !selector.is_null() {
		spec["selector"] = selector;
	}
	monitoring_object(MONITORING_V1, "ServiceMonitor", namespace, name, json!({}), spec)
}

pub fn pod_monitor(namespace: &str, name: &str, selector: Value, ports: &[&str]) -> Value {
	let endpoints: Vec<Value> = ports.iter().map(|port| json!({"port": port})).collect();
	let mut spec = json!({"podMetricsEndpoints": endpoints});
	if !selector.is_null() {
		spec["selector"] = selector;
	}
	monitoring_object(MONITORING_V1, "PodMonitor", namespace, name, json!({}), spec)
}
