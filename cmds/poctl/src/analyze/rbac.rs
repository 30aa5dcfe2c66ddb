//! ClusterRole and ClusterRoleBinding verification.

use std::{collections::BTreeSet, fmt, sync::Arc};

use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use serde::Serialize;
use thiserror::Error;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, instrument};

use super::AnalyzeError;
use crate::k8s::{crds::MONITORING_GROUP, AccessError, ClusterState};

/// Verbs a Prometheus server needs on everything it discovers.
pub const REQUIRED_VERBS: [&str; 3] = ["get", "list", "watch"];

/// CRDs the operator reconciles and therefore must be allowed to access.
pub const REQUIRED_CRDS: [&str; 10] = [
	"alertmanagers.monitoring.coreos.com",
	"alertmanagerconfigs.monitoring.coreos.com",
	"podmonitors.monitoring.coreos.com",
	"probes.monitoring.coreos.com",
	"prometheusagents.monitoring.coreos.com",
	"prometheuses.monitoring.coreos.com",
	"prometheusrules.monitoring.coreos.com",
	"scrapeconfigs.monitoring.coreos.com",
	"servicemonitors.monitoring.coreos.com",
	"thanosrulers.monitoring.coreos.com",
];

const MAX_CONCURRENT_CRD_LOOKUPS: usize = 4;

/// A single missing permission in a ClusterRole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RbacFinding {
	#[serde(rename_all = "camelCase")]
	ConfigMapsWithoutGet { role: String },
	#[serde(rename_all = "camelCase")]
	MissingVerbs {
		role: String,
		resource: String,
		api_groups: Vec<String>,
		verbs: Vec<String>,
	},
	#[serde(rename_all = "camelCase")]
	MetricsWithoutGet { role: String },
}

impl fmt::Display for RbacFinding {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::ConfigMapsWithoutGet { role } => write!(
				f,
				"ClusterRole {role} does not include 'configmaps' with 'get' in its verbs"
			),
			Self::MissingVerbs {
				role,
				resource,
				api_groups,
				verbs,
			} => write!(
				f,
				"ClusterRole {role} is missing necessary verbs [{}] on {resource} for APIGroups: [{}]",
				verbs.join(", "),
				api_groups.join(", ")
			),
			Self::MetricsWithoutGet { role } => write!(
				f,
				"ClusterRole {role} does not include 'get' verb for NonResourceURL '/metrics'"
			),
		}
	}
}

/// All findings for one ClusterRole, reported together.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{}", render_lines(.findings))]
pub struct RbacFindings {
	pub role: String,
	pub findings: Vec<RbacFinding>,
}

pub(crate) fn render_lines<T: fmt::Display>(items: &[T]) -> String {
	items
		.iter()
		.map(ToString::to_string)
		.collect::<Vec<_>>()
		.join("\n")
}

fn grants(verbs: &[String], verb: &str) -> bool {
	verbs.iter().any(|v| v == verb || v == "*")
}

/// Check every rule of `role` for the permissions a Prometheus server needs.
///
/// Rules are scanned in order and every finding is kept, so a single run
/// reports everything that has to be fixed in the role.
pub fn verify_cluster_role_rules(role_name: &str, role: &ClusterRole) -> Result<(), RbacFindings> {
	let mut findings = Vec::new();

	for rule in role.rules.iter().flatten() {
		check_rule(role_name, rule, &mut findings);
	}

	if findings.is_empty() {
		Ok(())
	} else {
		Err(RbacFindings {
			role: role_name.to_string(),
			findings,
		})
	}
}

fn check_rule(role_name: &str, rule: &PolicyRule, findings: &mut Vec<RbacFinding>) {
	let api_groups = rule.api_groups.clone().unwrap_or_default();

	for resource in rule.resources.iter().flatten() {
		if resource == "configmaps" {
			if !grants(&rule.verbs, "get") {
				findings.push(RbacFinding::ConfigMapsWithoutGet {
					role: role_name.to_string(),
				});
			}
			continue;
		}

		if api_groups.is_empty() {
			continue;
		}

		let missing: Vec<String> = REQUIRED_VERBS
			.iter()
			.filter(|verb| !grants(&rule.verbs, verb))
			.map(|verb| verb.to_string())
			.collect();
		if !missing.is_empty() {
			findings.push(RbacFinding::MissingVerbs {
				role: role_name.to_string(),
				resource: resource.clone(),
				api_groups: api_groups.clone(),
				verbs: missing,
			});
		}
	}

	for url in rule.non_resource_urls.iter().flatten() {
		if url == "/metrics" && !grants(&rule.verbs, "get") {
			findings.push(RbacFinding::MetricsWithoutGet {
				role: role_name.to_string(),
			});
		}
	}
}

/// Fail unless some binding has a ServiceAccount subject named `service_account`.
pub fn ensure_service_account_bound(
	bindings: &[ClusterRoleBinding],
	service_account: &str,
) -> Result<(), AnalyzeError> {
	let bound = bindings.iter().any(|binding| {
		binding
			.subjects
			.iter()
			.flatten()
			.any(|subject| subject.kind == "ServiceAccount" && subject.name == service_account)
	});

	if bound {
		Ok(())
	} else {
		Err(AnalyzeError::ServiceAccountNotBound(service_account.to_string()))
	}
}

/// Fetch the ClusterRole behind every binding and verify its rules.
///
/// Bindings are processed in list order; the first role with findings stops
/// the analysis.
#[instrument(skip_all)]
pub async fn verify_bound_roles(
	state: &ClusterState,
	bindings: &[ClusterRoleBinding],
) -> Result<(), AnalyzeError> {
	for binding in bindings {
		let role_name = &binding.role_ref.name;
		let role: ClusterRole = state.get_cluster(role_name).await?;
		verify_cluster_role_rules(role_name, &role)?;
		debug!(role = %role_name, "ClusterRole grants required permissions");
	}
	Ok(())
}

/// Verify that `role` covers every Prometheus Operator CRD.
///
/// Rules are only considered when they name the monitoring.coreos.com API
/// group; their resources are merged before the CRDs are checked. CRDs are
/// fetched concurrently but checked in [`REQUIRED_CRDS`] order, so the first
/// reported gap is stable.
#[instrument(skip(state, role))]
pub async fn verify_crd_coverage(
	state: &ClusterState,
	role_name: &str,
	role: &ClusterRole,
) -> Result<(), AnalyzeError> {
	let monitoring_rules: Vec<&PolicyRule> = role
		.rules
		.iter()
		.flatten()
		.filter(|rule| {
			rule.api_groups
				.iter()
				.flatten()
				.any(|group| group == MONITORING_GROUP)
		})
		.collect();

	if monitoring_rules.is_empty() {
		return Err(AnalyzeError::MissingMonitoringApiGroup(role_name.to_string()));
	}

	let resources: BTreeSet<&str> = monitoring_rules
		.iter()
		.flat_map(|rule| rule.resources.iter().flatten())
		.map(String::as_str)
		.collect();

	let crds = fetch_crds(state).await?;

	for (crd_name, crd) in REQUIRED_CRDS.iter().zip(crds) {
		let crd = crd?;
		let names = &crd.spec.names;
		let singular = names.singular.as_deref().unwrap_or_default();

		let covered = [names.plural.as_str(), singular]
			.into_iter()
			.filter(|name| !name.is_empty())
			.any(|name| {
				resources.contains(name) || resources.contains(format!("{name}/finalizers").as_str())
			});

		if !covered {
			return Err(AnalyzeError::MissingCrd {
				role: role_name.to_string(),
				crd: names.plural.clone(),
			});
		}

		debug!(crd = %crd_name, "ClusterRole covers CRD");
	}

	Ok(())
}

/// Fetch all required CRDs, returning results in [`REQUIRED_CRDS`] order.
async fn fetch_crds(
	state: &ClusterState,
) -> Result<Vec<Result<CustomResourceDefinition, AccessError>>, AnalyzeError> {
	let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_CRD_LOOKUPS));
	let mut join_set = JoinSet::new();

	for (index, name) in REQUIRED_CRDS.into_iter().enumerate() {
		let state = state.clone();
		let sem = semaphore.clone();

		join_set.spawn(async move {
			let _permit = sem.acquire().await.expect("semaphore closed");
			(
				index,
				state.get_cluster::<CustomResourceDefinition>(name).await,
			)
		});
	}

	let mut results: Vec<Option<Result<CustomResourceDefinition, AccessError>>> =
		(0..REQUIRED_CRDS.len()).map(|_| None).collect();

	while let Some(joined) = join_set.join_next().await {
		let (index, result) = joined.map_err(AnalyzeError::TaskFailed)?;
		results[index] = Some(result);
	}

	Ok(results.into_iter().flatten().collect())
}
