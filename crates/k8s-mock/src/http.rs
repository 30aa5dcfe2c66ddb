//! HTTP-based mock Kubernetes server using wiremock.
//!
//! This provides a real HTTP server that can be used with actual kubeconfig-based
//! connections. It serves read-only GET and LIST requests for the resources it
//! was started with.

use std::{collections::BTreeMap, sync::Arc};

use bon::Builder;
use kube::config::{
	AuthInfo, Cluster, Context, Kubeconfig, NamedAuthInfo, NamedCluster, NamedContext,
};
use serde_json::{json, Value};
use tracing::{debug, trace};
use wiremock::{
	matchers::{method, path, path_regex},
	Mock, MockServer, Request, ResponseTemplate,
};

use super::{discovery::MockDiscovery, selector};

/// Resources keyed by (collection path, name). Lists come back in key order.
type ResourceMap = BTreeMap<(String, String), Value>;

/// A canned error response for one API path.
#[derive(Debug, Clone)]
pub struct MockFailure {
	pub path: String,
	pub status: u16,
}

impl MockFailure {
	pub fn new(path: impl Into<String>, status: u16) -> Self {
		Self {
			path: path.into(),
			status,
		}
	}
}

/// A mock Kubernetes server exposed over HTTP.
#[derive(Builder)]
pub struct HttpMockK8sServer {
	/// Resources to serve as raw manifests. The server derives API paths from
	/// apiVersion/kind using the discovery data.
	#[builder(default)]
	resources: Vec<Value>,
	/// Paths that answer with an error status instead of their resources.
	#[builder(default)]
	failures: Vec<MockFailure>,
}

/// A running HTTP mock server instance.
pub struct RunningHttpMockK8sServer {
	server: MockServer,
}

impl HttpMockK8sServer {
	/// Start the mock server with all configured resources.
	pub async fn start(self) -> RunningHttpMockK8sServer {
		let server = MockServer::start().await;
		let discovery = MockDiscovery::default();

		debug!(uri = %server.uri(), "Started mock K8s server");

		let mut resources = ResourceMap::new();
		for manifest in self.resources {
			if let Some((api_path, name)) = api_path_for_manifest(&manifest, &discovery) {
				trace!(api_path = %api_path, name = %name, "Registered resource");
				resources.insert((api_path, name), manifest);
			}
		}

		// Add default namespace if not present
		let ns_key = ("/api/v1/namespaces".to_string(), "default".to_string());
		resources.entry(ns_key).or_insert_with(|| {
			json!({
				"apiVersion": "v1",
				"kind": "Namespace",
				"metadata": {
					"name": "default"
				}
			})
		});

		mount_version(&server).await;
		mount_failures(&server, &self.failures).await;
		mount_resources(&server, discovery, resources).await;

		RunningHttpMockK8sServer { server }
	}
}

/// Derive the collection path and name for a manifest using discovery data.
fn api_path_for_manifest(manifest: &Value, discovery: &MockDiscovery) -> Option<(String, String)> {
	let api_version = manifest.get("apiVersion")?.as_str()?;
	let kind = manifest.get("kind")?.as_str()?;
	let name = manifest.pointer("/metadata/name")?.as_str()?.to_string();
	let namespace = manifest
		.pointer("/metadata/namespace")
		.and_then(Value::as_str)
		.unwrap_or("default");

	let resource = discovery.find(api_version, kind)?;
	let base = if api_version.contains('/') {
		format!("/apis/{api_version}")
	} else {
		format!("/api/{api_version}")
	};

	let path = if resource.namespaced {
		format!("{base}/namespaces/{namespace}/{}", resource.name)
	} else {
		format!("{base}/{}", resource.name)
	};

	Some((path, name))
}

impl RunningHttpMockK8sServer {
	/// Get the server's URI (e.g., "http://127.0.0.1:12345").
	pub fn uri(&self) -> String {
		self.server.uri()
	}

	/// Create a Kubeconfig pointing to this mock server.
	pub fn kubeconfig(&self) -> Kubeconfig {
		self.kubeconfig_with_context("mock-context")
	}

	/// Create a Kubeconfig pointing to this mock server with a custom context name.
	pub fn kubeconfig_with_context(&self, context_name: &str) -> Kubeconfig {
		let cluster_name = "mock-cluster";
		let user_name = "mock-user";

		Kubeconfig {
			clusters: vec![NamedCluster {
				name: cluster_name.to_string(),
				cluster: Some(Cluster {
					server: Some(self.uri()),
					insecure_skip_tls_verify: Some(true),
					..Default::default()
				}),
			}],
			contexts: vec![NamedContext {
				name: context_name.to_string(),
				context: Some(Context {
					cluster: cluster_name.to_string(),
					user: Some(user_name.to_string()),
					namespace: Some("default".to_string()),
					..Default::default()
				}),
			}],
			auth_infos: vec![NamedAuthInfo {
				name: user_name.to_string(),
				auth_info: Some(AuthInfo::default()),
			}],
			current_context: Some(context_name.to_string()),
			..Default::default()
		}
	}

	/// Paths of every API request received so far, in arrival order.
	pub async fn received_paths(&self) -> Vec<String> {
		self.server
			.received_requests()
			.await
			.unwrap_or_default()
			.into_iter()
			.filter(|req| req.url.path() != "/version")
			.map(|req| req.url.path().to_string())
			.collect()
	}

	/// Number of received requests for exactly `path`.
	pub async fn request_count(&self, path: &str) -> usize {
		self.received_paths()
			.await
			.iter()
			.filter(|p| p.as_str() == path)
			.count()
	}
}

fn status(code: u16, reason: &str, message: &str) -> ResponseTemplate {
	ResponseTemplate::new(code).set_body_json(json!({
		"kind": "Status",
		"apiVersion": "v1",
		"metadata": {},
		"status": "Failure",
		"message": message,
		"reason": reason,
		"code": code
	}))
}

fn list(items: Vec<Value>) -> ResponseTemplate {
	ResponseTemplate::new(200).set_body_json(json!({
		"kind": "List",
		"apiVersion": "v1",
		"metadata": {"resourceVersion": "1"},
		"items": items
	}))
}

async fn mount_version(server: &MockServer) {
	Mock::given(method("GET"))
		.and(path("/version"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"major": "1",
			"minor": "31",
			"gitVersion": "v1.31.0",
			"gitCommit": "fake",
			"gitTreeState": "clean",
			"buildDate": "2024-08-13T00:00:00Z",
			"goVersion": "go1.22.5",
			"compiler": "gc",
			"platform": "linux/amd64"
		})))
		.mount(server)
		.await;
}

async fn mount_failures(server: &MockServer, failures: &[MockFailure]) {
	for failure in failures {
		let reason = match failure.status {
			403 => "Forbidden",
			404 => "NotFound",
			_ => "InternalError",
		};
		Mock::given(method("GET"))
			.and(path(failure.path.as_str()))
			.respond_with(status(failure.status, reason, "injected failure"))
			.with_priority(1)
			.mount(server)
			.await;
	}
}

async fn mount_resources(server: &MockServer, discovery: MockDiscovery, resources: ResourceMap) {
	let resources = Arc::new(resources);
	let discovery = Arc::new(discovery);

	// GET handles both single objects and LIST, told apart by the discovery catalog
	Mock::given(method("GET"))
		.and(path_regex(r"^/api(s)?/.*"))
		.respond_with(move |req: &Request| {
			let path_str = req.url.path().trim_end_matches('/');

			if discovery.is_collection(path_str) {
				let label_selector = req
					.url
					.query_pairs()
					.find(|(key, _)| key == "labelSelector")
					.map(|(_, value)| value.into_owned())
					.unwrap_or_default();

				let items = resources
					.iter()
					.filter(|((res_api_path, _), _)| {
						res_api_path == path_str
							|| extract_cluster_wide_path(res_api_path).as_deref() == Some(path_str)
					})
					.filter(|(_, manifest)| selector::matches(&label_selector, manifest))
					.map(|(_, manifest)| manifest.clone())
					.collect();
				return list(items);
			}

			let (api_path, name) = parse_resource_path(path_str);
			match resources.get(&(api_path, name.clone())) {
				Some(resource) => ResponseTemplate::new(200).set_body_json(resource.clone()),
				None => status(404, "NotFound", &format!("{name} not found")),
			}
		})
		.mount(server)
		.await;
}

/// Parse a Kubernetes API path into (api_path, resource_name).
///
/// Examples:
/// - `/api/v1/namespaces/default/configmaps/my-config` -> (`/api/v1/namespaces/default/configmaps`, `my-config`)
/// - `/apis/apps/v1/namespaces/default/deployments/my-deploy` -> (`/apis/apps/v1/namespaces/default/deployments`, `my-deploy`)
/// - `/api/v1/namespaces/my-ns` -> (`/api/v1/namespaces`, `my-ns`)
fn parse_resource_path(path: &str) -> (String, String) {
	match path.rsplit_once('/') {
		Some((api_path, name)) => (api_path.to_string(), name.to_string()),
		None => (path.to_string(), String::new()),
	}
}

/// Extract a cluster-wide path from a namespaced API path.
///
/// Examples:
/// - `/api/v1/namespaces/default/configmaps` -> Some(`/api/v1/configmaps`)
/// - `/apis/apps/v1/namespaces/default/deployments` -> Some(`/apis/apps/v1/deployments`)
/// - `/api/v1/namespaces` -> None (already cluster-wide for namespaces)
fn extract_cluster_wide_path(path: &str) -> Option<String> {
	let (before_ns, after_ns) = path.split_once("/namespaces/")?;
	let (_, resource_type) = after_ns.split_once('/')?;
	Some(format!("{before_ns}/{resource_type}"))
}
