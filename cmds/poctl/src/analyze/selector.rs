//! Label selector resolution.
//!
//! Selectors found on Prometheus Operator resources have three meaningful
//! states: absent, present but empty, and present with criteria. The operator
//! treats them differently, and so do these checks.

use std::fmt;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use thiserror::Error;
use tracing::{debug, instrument};

use super::AnalyzeError;
use crate::k8s::{crds, AccessError, ClusterState};

/// Errors produced while interpreting or resolving a selector.
#[derive(Debug, Error)]
pub enum SelectorError {
	#[error("{0} selector is not defined")]
	NotDefined(MonitoringResource),

	#[error("unsupported operator {operator:?} for key {key:?}")]
	UnknownOperator { key: String, operator: String },

	#[error("operator {operator} for key {key:?} requires at least one value")]
	MissingValues { key: String, operator: String },

	#[error("operator {operator} for key {key:?} does not accept values")]
	UnexpectedValues { key: String, operator: String },

	#[error("no namespaces match the selector {0}")]
	NoNamespaces(String),

	#[error("no {resource}s match the provided selector in {namespace}")]
	NoMatch {
		resource: MonitoringResource,
		namespace: String,
	},

	#[error(transparent)]
	Access(#[from] AccessError),
}

impl SelectorError {
	/// Whether the selector was valid but matched nothing.
	pub fn is_no_match(&self) -> bool {
		matches!(self, Self::NoNamespaces(_) | Self::NoMatch { .. })
	}

	/// Whether the selector itself could not be interpreted.
	pub fn is_malformed(&self) -> bool {
		matches!(
			self,
			Self::UnknownOperator { .. } | Self::MissingValues { .. } | Self::UnexpectedValues { .. }
		)
	}
}

/// Classification of an optional selector field.
#[derive(Debug, Clone, Copy)]
pub enum SelectorState<'a> {
	/// The field is not set at all.
	Absent,
	/// The field is set but has neither labels nor expressions.
	Empty,
	/// The field carries at least one label or expression.
	Criteria(&'a LabelSelector),
}

impl<'a> SelectorState<'a> {
	pub fn of(selector: Option<&'a LabelSelector>) -> Self {
		match selector {
			None => Self::Absent,
			Some(selector) if is_empty(selector) => Self::Empty,
			Some(selector) => Self::Criteria(selector),
		}
	}
}

fn is_empty(selector: &LabelSelector) -> bool {
	selector.match_labels.as_ref().is_none_or(|l| l.is_empty())
		&& selector
			.match_expressions
			.as_ref()
			.is_none_or(|e| e.is_empty())
}

/// Monitoring resources a Prometheus or Alertmanager selects by label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitoringResource {
	ServiceMonitor,
	PodMonitor,
	Probe,
	ScrapeConfig,
	PrometheusRule,
	AlertmanagerConfig,
}

impl MonitoringResource {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::ServiceMonitor => "ServiceMonitor",
			Self::PodMonitor => "PodMonitor",
			Self::Probe => "Probe",
			Self::ScrapeConfig => "ScrapeConfig",
			Self::PrometheusRule => "PrometheusRule",
			Self::AlertmanagerConfig => "AlertmanagerConfig",
		}
	}
}

impl fmt::Display for MonitoringResource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Render a selector as an API server `labelSelector` query.
///
/// Labels come first in key order, followed by expressions in their declared
/// order. Set values are sorted so equal selectors render identically.
pub fn to_query(selector: &LabelSelector) -> Result<String, SelectorError> {
	let mut terms = Vec::new();

	if let Some(labels) = &selector.match_labels {
		terms.extend(labels.iter().map(|(key, value)| format!("{key}={value}")));
	}

	for requirement in selector.match_expressions.iter().flatten() {
		terms.push(requirement_term(requirement)?);
	}

	Ok(terms.join(","))
}

fn requirement_term(requirement: &LabelSelectorRequirement) -> Result<String, SelectorError> {
	let key = &requirement.key;
	let operator = requirement.operator.as_str();
	let values: &[String] = requirement.values.as_deref().unwrap_or_default();

	match operator {
		"In" | "NotIn" => {
			if values.is_empty() {
				return Err(SelectorError::MissingValues {
					key: key.clone(),
					operator: operator.to_string(),
				});
			}
			let mut sorted = values.to_vec();
			sorted.sort();
			let op = if operator == "In" { "in" } else { "notin" };
			Ok(format!("{key} {op} ({})", sorted.join(",")))
		}
		"Exists" | "DoesNotExist" => {
			if !values.is_empty() {
				return Err(SelectorError::UnexpectedValues {
					key: key.clone(),
					operator: operator.to_string(),
				});
			}
			if operator == "Exists" {
				Ok(key.clone())
			} else {
				Ok(format!("!{key}"))
			}
		}
		_ => Err(SelectorError::UnknownOperator {
			key: key.clone(),
			operator: operator.to_string(),
		}),
	}
}

/// Check that a namespace selector, if it has criteria, matches at least one
/// namespace. Absent and empty selectors need no lookup.
#[instrument(skip_all)]
pub async fn resolve_namespace_selector(
	state: &ClusterState,
	selector: Option<&LabelSelector>,
) -> Result<(), SelectorError> {
	let SelectorState::Criteria(selector) = SelectorState::of(selector) else {
		debug!("namespace selector has no criteria, skipping lookup");
		return Ok(());
	};

	let query = to_query(selector)?;
	let namespaces = state.list_cluster::<Namespace>(Some(&query)).await?;
	if namespaces.is_empty() {
		return Err(SelectorError::NoNamespaces(query));
	}

	debug!(selector = %query, count = namespaces.len(), "namespace selector resolved");
	Ok(())
}

/// Check that a resource selector matches at least one object of `resource`
/// in `namespace`.
///
/// An absent selector is an error since the operator then selects nothing;
/// an empty one selects everything and needs no lookup.
#[instrument(skip(state, selector))]
pub async fn resolve_label_selector(
	state: &ClusterState,
	selector: Option<&LabelSelector>,
	resource: MonitoringResource,
	namespace: &str,
) -> Result<(), SelectorError> {
	let selector = match SelectorState::of(selector) {
		SelectorState::Absent => return Err(SelectorError::NotDefined(resource)),
		SelectorState::Empty => {
			debug!("selector is empty and matches everything");
			return Ok(());
		}
		SelectorState::Criteria(selector) => selector,
	};

	let query = to_query(selector)?;
	let matched = count_matching(state, resource, namespace, &query).await?;
	if matched == 0 {
		return Err(SelectorError::NoMatch {
			resource,
			namespace: namespace.to_string(),
		});
	}

	debug!(selector = %query, count = matched, "label selector resolved");
	Ok(())
}

async fn count_matching(
	state: &ClusterState,
	resource: MonitoringResource,
	namespace: &str,
	query: &str,
) -> Result<usize, AccessError> {
	let query = Some(query);
	Ok(match resource {
		MonitoringResource::ServiceMonitor => {
			state.list::<crds::ServiceMonitor>(namespace, query).await?.len()
		}
		MonitoringResource::PodMonitor => {
			state.list::<crds::PodMonitor>(namespace, query).await?.len()
		}
		MonitoringResource::Probe => state.list::<crds::Probe>(namespace, query).await?.len(),
		MonitoringResource::ScrapeConfig => {
			state.list::<crds::ScrapeConfig>(namespace, query).await?.len()
		}
		MonitoringResource::PrometheusRule => {
			state.list::<crds::PrometheusRule>(namespace, query).await?.len()
		}
		MonitoringResource::AlertmanagerConfig => {
			state
				.list::<crds::AlertmanagerConfig>(namespace, query)
				.await?
				.len()
		}
	})
}

/// Resolve each named namespace selector in order, stopping at the first failure.
pub async fn check_namespace_selectors(
	state: &ClusterState,
	fields: &[(&'static str, Option<&LabelSelector>)],
) -> Result<(), AnalyzeError> {
	for &(field, selector) in fields {
		resolve_namespace_selector(state, selector)
			.await
			.map_err(|source| AnalyzeError::Selector { field, source })?;
	}
	Ok(())
}

/// Resolve each named resource selector in order, stopping at the first failure.
pub async fn check_label_selectors(
	state: &ClusterState,
	namespace: &str,
	fields: &[(&'static str, Option<&LabelSelector>, MonitoringResource)],
) -> Result<(), AnalyzeError> {
	for &(field, selector, resource) in fields {
		resolve_label_selector(state, selector, resource, namespace)
			.await
			.map_err(|source| AnalyzeError::Selector { field, source })?;
	}
	Ok(())
}
