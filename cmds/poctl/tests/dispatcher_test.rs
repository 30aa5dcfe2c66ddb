//! Routing of analysis targets and run-level behavior.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use common::{cluster, cluster_with_failures, service, service_monitor};
use k8s_mock::MockFailure;
use poctl::analyze::{
	self, report::AnalysisReport, AnalysisTarget, AnalyzeConfig, AnalyzeError, AnalyzerSettings,
	Dispatcher, ErrorClass,
};
use serde_json::json;

fn config(kind: &str, name: &str, namespace: &str) -> AnalyzeConfig {
	AnalyzeConfig {
		target: AnalysisTarget::parse(kind, name, namespace).unwrap(),
		settings: AnalyzerSettings::default(),
		timeout: Some(Duration::from_secs(30)),
	}
}

#[test]
fn test_unsupported_kind_is_rejected_without_cluster() {
	let err = AnalysisTarget::parse("foo", "x", "default").unwrap_err();

	assert_eq!(err.to_string(), "kind foo not supported");
	assert_eq!(err.class(), ErrorClass::UnsupportedKind);
}

#[tokio::test]
async fn test_dispatch_routes_by_kind() {
	let (_server, state) = cluster(vec![
		service_monitor("monitoring", "web", json!({"matchLabels": {"app": "web"}}), &["metrics"]),
		service("monitoring", "web", json!({"app": "web"}), &[("metrics", 9090)]),
	])
	.await;
	let dispatcher = Dispatcher::default();

	let target = AnalysisTarget::parse("ServiceMonitor", "web", "monitoring").unwrap();
	dispatcher.dispatch(&state, &target).await.unwrap();

	let target = AnalysisTarget::parse("Prometheus", "web", "monitoring").unwrap();
	let err = dispatcher.dispatch(&state, &target).await.unwrap_err();
	assert_eq!(err.to_string(), "Prometheus web not found in namespace monitoring");

	let target = AnalysisTarget::parse("Alertmanager", "web", "monitoring").unwrap();
	let err = dispatcher.dispatch(&state, &target).await.unwrap_err();
	assert_eq!(err.to_string(), "Alertmanager web not found in namespace monitoring");
}

#[tokio::test]
async fn test_repeated_runs_give_the_same_report() {
	let (_server, state) = cluster(vec![
		service_monitor("test", "a", json!({}), &["http"]),
		service_monitor("test", "b", json!({}), &["http"]),
		service("test", "svc1", json!({"app": "web"}), &[("http", 80)]),
		service("test", "svc2", json!({"app": "api"}), &[("http", 80)]),
	])
	.await;
	let config = config("overlapping", "all", "test");

	let first = analyze::run(&state, &config).await;
	let second = analyze::run(&state, &config).await;

	let first = serde_json::to_value(AnalysisReport::new(&config.target, &first)).unwrap();
	let second = serde_json::to_value(AnalysisReport::new(&config.target, &second)).unwrap();
	assert_eq!(first, second);
	assert_eq!(first["compliant"], json!(false));
	assert_eq!(first["errorClass"], json!("overlapFinding"));
	assert_eq!(first["findings"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_api_failure_is_reported_as_access_error() {
	let (_server, state) = cluster_with_failures(
		vec![],
		vec![MockFailure::new(
			"/apis/monitoring.coreos.com/v1/namespaces/monitoring/servicemonitors/web",
			403,
		)],
	)
	.await;

	let err = analyze::run(&state, &config("servicemonitor", "web", "monitoring"))
		.await
		.unwrap_err();

	assert_matches!(err, AnalyzeError::Access(_));
	assert_eq!(err.class(), ErrorClass::Access);
	assert_eq!(
		err.to_string(),
		"failed to get ServiceMonitor web in namespace monitoring"
	);
}
