//! Read-only access to cluster objects.
//!
//! Analyzers only ever fetch and list; [`ClusterState`] is the single seam
//! through which they reach the API server, so tests can point it at a mock.

use std::fmt::Debug;

use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::{
	api::{Api, ListParams},
	Client, Resource,
};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

/// Errors raised while reading objects from the cluster.
#[derive(Debug, Error)]
pub enum AccessError {
	#[error("{kind} {name} not found{}", in_namespace(.namespace.as_deref()))]
	NotFound {
		kind: String,
		name: String,
		namespace: Option<String>,
	},

	#[error("failed to get {kind} {name}{}", in_namespace(.namespace.as_deref()))]
	Get {
		kind: String,
		name: String,
		namespace: Option<String>,
		#[source]
		source: kube::Error,
	},

	#[error("failed to list {kind}{}", in_namespace(.namespace.as_deref()))]
	List {
		kind: String,
		namespace: Option<String>,
		#[source]
		source: kube::Error,
	},
}

impl AccessError {
	pub fn is_not_found(&self) -> bool {
		matches!(self, Self::NotFound { .. })
	}
}

fn in_namespace(namespace: Option<&str>) -> String {
	namespace
		.map(|ns| format!(" in namespace {ns}"))
		.unwrap_or_default()
}

/// Handle for reading cluster objects. Cheap to clone.
#[derive(Clone)]
pub struct ClusterState {
	client: Client,
}

impl Debug for ClusterState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ClusterState").finish_non_exhaustive()
	}
}

impl ClusterState {
	pub fn new(client: Client) -> Self {
		Self { client }
	}

	/// Fetch a namespaced object by name.
	pub async fn get<K>(&self, name: &str, namespace: &str) -> Result<K, AccessError>
	where
		K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
			+ Clone
			+ DeserializeOwned
			+ Debug,
	{
		let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
		fetch(api, name, Some(namespace)).await
	}

	/// Fetch a cluster-scoped object by name.
	pub async fn get_cluster<K>(&self, name: &str) -> Result<K, AccessError>
	where
		K: Resource<Scope = ClusterResourceScope, DynamicType = ()>
			+ Clone
			+ DeserializeOwned
			+ Debug,
	{
		let api: Api<K> = Api::all(self.client.clone());
		fetch(api, name, None).await
	}

	/// List namespaced objects, optionally filtered by a label selector query.
	pub async fn list<K>(
		&self,
		namespace: &str,
		label_selector: Option<&str>,
	) -> Result<Vec<K>, AccessError>
	where
		K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
			+ Clone
			+ DeserializeOwned
			+ Debug,
	{
		let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
		list(api, label_selector, Some(namespace)).await
	}

	/// List cluster-scoped objects, optionally filtered by a label selector query.
	pub async fn list_cluster<K>(&self, label_selector: Option<&str>) -> Result<Vec<K>, AccessError>
	where
		K: Resource<Scope = ClusterResourceScope, DynamicType = ()>
			+ Clone
			+ DeserializeOwned
			+ Debug,
	{
		let api: Api<K> = Api::all(self.client.clone());
		list(api, label_selector, None).await
	}
}

async fn fetch<K>(api: Api<K>, name: &str, namespace: Option<&str>) -> Result<K, AccessError>
where
	K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
	let kind = K::kind(&()).to_string();
	debug!(kind = %kind, name = %name, namespace = ?namespace, "fetching object");

	match api.get(name).await {
		Ok(obj) => Ok(obj),
		Err(kube::Error::Api(ref err)) if err.code == 404 => Err(AccessError::NotFound {
			kind,
			name: name.to_string(),
			namespace: namespace.map(str::to_string),
		}),
		Err(source) => Err(AccessError::Get {
			kind,
			name: name.to_string(),
			namespace: namespace.map(str::to_string),
			source,
		}),
	}
}

async fn list<K>(
	api: Api<K>,
	label_selector: Option<&str>,
	namespace: Option<&str>,
) -> Result<Vec<K>, AccessError>
where
	K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
	let params = match label_selector {
		Some(selector) => ListParams::default().labels(selector),
		None => ListParams::default(),
	};

	let list = api.list(&params).await.map_err(|source| AccessError::List {
		kind: K::kind(&()).to_string(),
		namespace: namespace.map(str::to_string),
		source,
	})?;

	debug!(
		kind = %K::kind(&()),
		namespace = ?namespace,
		selector = ?label_selector,
		count = list.items.len(),
		"listed objects"
	);

	Ok(list.items)
}
