//! Resource catalog served by the mock API server.

use std::collections::BTreeMap;

/// Resource types the mock server knows how to route, keyed by group version.
pub struct MockDiscovery {
	pub core_resources: Vec<MockApiResource>,
	pub group_resources: BTreeMap<String, Vec<MockApiResource>>,
}

impl Default for MockDiscovery {
	fn default() -> Self {
		let monitoring_v1 = vec![
			MockApiResource::namespaced("prometheuses", "Prometheus"),
			MockApiResource::namespaced("alertmanagers", "Alertmanager"),
			MockApiResource::namespaced("servicemonitors", "ServiceMonitor"),
			MockApiResource::namespaced("podmonitors", "PodMonitor"),
			MockApiResource::namespaced("probes", "Probe"),
			MockApiResource::namespaced("prometheusrules", "PrometheusRule"),
		];
		let monitoring_v1alpha1 = vec![
			MockApiResource::namespaced("prometheusagents", "PrometheusAgent"),
			MockApiResource::namespaced("scrapeconfigs", "ScrapeConfig"),
			MockApiResource::namespaced("alertmanagerconfigs", "AlertmanagerConfig"),
		];

		Self {
			core_resources: vec![
				MockApiResource::namespaced("configmaps", "ConfigMap"),
				MockApiResource::namespaced("secrets", "Secret"),
				MockApiResource::namespaced("services", "Service"),
				MockApiResource::namespaced("serviceaccounts", "ServiceAccount"),
				MockApiResource::namespaced("pods", "Pod"),
				MockApiResource::cluster_scoped("namespaces", "Namespace"),
			],
			group_resources: BTreeMap::from([
				(
					"apps/v1".to_string(),
					vec![
						MockApiResource::namespaced("deployments", "Deployment"),
						MockApiResource::namespaced("statefulsets", "StatefulSet"),
					],
				),
				(
					"rbac.authorization.k8s.io/v1".to_string(),
					vec![
						MockApiResource::cluster_scoped("clusterroles", "ClusterRole"),
						MockApiResource::cluster_scoped("clusterrolebindings", "ClusterRoleBinding"),
					],
				),
				(
					"apiextensions.k8s.io/v1".to_string(),
					vec![MockApiResource::cluster_scoped(
						"customresourcedefinitions",
						"CustomResourceDefinition",
					)],
				),
				("monitoring.coreos.com/v1".to_string(), monitoring_v1),
				("monitoring.coreos.com/v1alpha1".to_string(), monitoring_v1alpha1),
			]),
		}
	}
}

impl MockDiscovery {
	/// Find the resource for an `apiVersion`/`kind` pair.
	pub fn find(&self, api_version: &str, kind: &str) -> Option<&MockApiResource> {
		let resources = if api_version == "v1" {
			&self.core_resources
		} else {
			self.group_resources.get(api_version)?
		};
		resources.iter().find(|r| r.kind == kind)
	}

	/// Every (base path, resource) pair, e.g. `("/apis/apps/v1", deployments)`.
	pub fn collections(&self) -> impl Iterator<Item = (String, &MockApiResource)> {
		let core = self
			.core_resources
			.iter()
			.map(|r| ("/api/v1".to_string(), r));
		let groups = self.group_resources.iter().flat_map(|(gv, resources)| {
			resources.iter().map(move |r| (format!("/apis/{gv}"), r))
		});
		core.chain(groups)
	}

	/// Whether `path` names a collection (a LIST request) rather than an object.
	///
	/// Collections are `<base>/<plural>` or `<base>/namespaces/<ns>/<plural>`.
	pub fn is_collection(&self, path: &str) -> bool {
		self.collections().any(|(base, resource)| {
			let Some(rest) = path.strip_prefix(base.as_str()) else {
				return false;
			};
			if rest.strip_prefix('/') == Some(resource.name.as_str()) {
				return true;
			}
			resource.namespaced
				&& rest
					.strip_prefix("/namespaces/")
					.and_then(|r| r.split_once('/'))
					.is_some_and(|(ns, plural)| !ns.is_empty() && plural == resource.name)
		})
	}
}

/// A mock API resource definition.
pub struct MockApiResource {
	pub name: String,
	pub kind: String,
	pub namespaced: bool,
}

impl MockApiResource {
	pub fn namespaced(name: &str, kind: &str) -> Self {
		Self {
			name: name.to_string(),
			kind: kind.to_string(),
			namespaced: true,
		}
	}

	pub fn cluster_scoped(name: &str, kind: &str) -> Self {
		Self {
			name: name.to_string(),
			kind: kind.to_string(),
			namespaced: false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_collection_paths() {
		let discovery = MockDiscovery::default();

		assert!(discovery.is_collection("/api/v1/namespaces"));
		assert!(discovery.is_collection("/api/v1/namespaces/monitoring/services"));
		assert!(discovery.is_collection("/api/v1/services"));
		assert!(discovery.is_collection("/apis/rbac.authorization.k8s.io/v1/clusterrolebindings"));
		assert!(discovery.is_collection(
			"/apis/monitoring.coreos.com/v1/namespaces/default/servicemonitors"
		));
	}

	#[test]
	fn test_object_paths() {
		let discovery = MockDiscovery::default();

		assert!(!discovery.is_collection("/api/v1/namespaces/monitoring"));
		assert!(!discovery.is_collection("/api/v1/namespaces/monitoring/services/web"));
		assert!(!discovery.is_collection("/apis/rbac.authorization.k8s.io/v1/clusterroles/admin"));
		// Cluster-scoped kinds have no namespaced collections
		assert!(!discovery.is_collection(
			"/apis/rbac.authorization.k8s.io/v1/namespaces/default/clusterroles"
		));
	}

	#[test]
	fn test_find_by_kind() {
		let discovery = MockDiscovery::default();

		let crd = discovery
			.find("apiextensions.k8s.io/v1", "CustomResourceDefinition")
			.unwrap();
		assert!(!crd.namespaced);
		assert_eq!(crd.name, "customresourcedefinitions");

		assert!(discovery.find("v1", "Service").unwrap().namespaced);
		assert!(discovery.find("v1", "Widget").is_none());
	}
}
