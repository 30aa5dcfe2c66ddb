//! Prometheus Operator analysis scenarios.

mod common;

use common::{
	cluster, cluster_role, cluster_role_binding, crd, deployment, monitoring_crds, CRD_NAMES,
};
use poctl::analyze::{
	operator::OperatorAnalyzer, AnalysisTarget, AnalyzeError, Analyzer, ErrorClass,
	OPERATOR_BINDING_SELECTOR,
};
use serde_json::{json, Value};

fn all_monitoring_resources() -> Vec<&'static str> {
	CRD_NAMES.iter().map(|(plural, _, _)| *plural).collect()
}

fn operator_cluster(rules: Value) -> Vec<Value> {
	let mut resources = vec![
		deployment("monitoring", "prometheus-operator", "prometheus-operator"),
		cluster_role("prometheus-operator", rules),
		cluster_role_binding(
			"prometheus-operator",
			json!({"app.kubernetes.io/name": "prometheus-operator"}),
			"prometheus-operator",
			"monitoring",
			"prometheus-operator",
		),
	];
	resources.extend(monitoring_crds());
	resources
}

async fn analyze(resources: Vec<Value>) -> Result<(), AnalyzeError> {
	let (_server, state) = cluster(resources).await;
	let target = AnalysisTarget::parse("operator", "prometheus-operator", "monitoring").unwrap();
	OperatorAnalyzer::new(OPERATOR_BINDING_SELECTOR)
		.analyze(&state, &target)
		.await
}

#[tokio::test]
async fn test_compliant_operator() {
	let rules = json!([
		{
			"apiGroups": ["monitoring.coreos.com"],
			"resources": all_monitoring_resources(),
			"verbs": ["*"]
		}
	]);

	analyze(operator_cluster(rules)).await.unwrap();
}

#[tokio::test]
async fn test_resources_merge_across_rules() {
	let all = all_monitoring_resources();
	let (first, second) = all.split_at(5);
	let rules = json!([
		{"apiGroups": ["monitoring.coreos.com"], "resources": first, "verbs": ["*"]},
		{"apiGroups": [""], "resources": ["configmaps", "secrets"], "verbs": ["*"]},
		{"apiGroups": ["monitoring.coreos.com"], "resources": second, "verbs": ["*"]}
	]);

	analyze(operator_cluster(rules)).await.unwrap();
}

#[tokio::test]
async fn test_finalizers_and_singular_names_count() {
	let resources: Vec<String> = CRD_NAMES
		.iter()
		.enumerate()
		.map(|(i, (plural, singular, _))| match i % 3 {
			0 => plural.to_string(),
			1 => format!("{plural}/finalizers"),
			_ => singular.to_string(),
		})
		.collect();
	let rules = json!([
		{"apiGroups": ["monitoring.coreos.com"], "resources": resources, "verbs": ["*"]}
	]);

	analyze(operator_cluster(rules)).await.unwrap();
}

#[tokio::test]
async fn test_role_without_monitoring_group() {
	let rules = json!([
		{"apiGroups": [""], "resources": ["configmaps"], "verbs": ["*"]}
	]);

	let err = analyze(operator_cluster(rules)).await.unwrap_err();
	assert_eq!(
		err.to_string(),
		"ClusterRole prometheus-operator does not have monitoring.coreos.com APIGroup in its rules"
	);
	assert_eq!(err.class(), ErrorClass::Compliance);
}

#[tokio::test]
async fn test_first_missing_crd_is_reported() {
	let resources: Vec<&str> = all_monitoring_resources()
		.into_iter()
		.filter(|name| *name != "probes" && *name != "thanosrulers")
		.collect();
	let rules = json!([
		{"apiGroups": ["monitoring.coreos.com"], "resources": resources, "verbs": ["*"]}
	]);

	let err = analyze(operator_cluster(rules)).await.unwrap_err();
	assert_eq!(
		err.to_string(),
		"ClusterRole prometheus-operator does not have probes in its rules"
	);
}

#[tokio::test]
async fn test_crd_missing_from_cluster() {
	let rules = json!([
		{
			"apiGroups": ["monitoring.coreos.com"],
			"resources": all_monitoring_resources(),
			"verbs": ["*"]
		}
	]);
	let resources: Vec<Value> = operator_cluster(rules)
		.into_iter()
		.filter(|r| r["metadata"]["name"] != "scrapeconfigs.monitoring.coreos.com")
		.collect();

	let err = analyze(resources).await.unwrap_err();
	assert_eq!(err.class(), ErrorClass::NotFound);
	assert_eq!(
		err.to_string(),
		"CustomResourceDefinition scrapeconfigs.monitoring.coreos.com not found"
	);
}

#[tokio::test]
async fn test_operator_service_account_not_bound() {
	let mut resources = operator_cluster(json!([]));
	resources[0] = deployment("monitoring", "prometheus-operator", "custom-sa");

	let err = analyze(resources).await.unwrap_err();
	assert_eq!(
		err.to_string(),
		"serviceAccount custom-sa is not bound to any ClusterRoleBinding"
	);
}

#[tokio::test]
async fn test_operator_deployment_not_found() {
	let err = analyze(vec![crd("probes", "probe", "Probe")]).await.unwrap_err();

	assert_eq!(err.class(), ErrorClass::NotFound);
	assert_eq!(
		err.to_string(),
		"Deployment prometheus-operator not found in namespace monitoring"
	);
}
