//! Compliance analysis of Prometheus Operator resources.
//!
//! An analysis takes one target object (kind, name, namespace), reads the
//! objects it depends on from the cluster, and fails with the first problem
//! it finds. Checks that look at many independent facts (RBAC verbs, monitor
//! overlaps) report everything they find in one aggregated error.

use std::{fmt, future::Future, str::FromStr, time::Duration};

use tracing::instrument;

use crate::config::PoctlConfig;
use crate::k8s::ClusterState;

pub mod alertmanager;
mod error;
pub mod operator;
pub mod overlap;
pub mod prometheus;
pub mod prometheus_agent;
pub mod rbac;
pub mod report;
pub mod selector;
pub mod service_monitor;

pub use error::{AnalyzeError, ErrorClass};

/// Label selecting the operator's ClusterRoleBindings.
pub const OPERATOR_BINDING_SELECTOR: &str = "app.kubernetes.io/name=prometheus-operator";
/// Label selecting Prometheus server ClusterRoleBindings.
pub const PROMETHEUS_BINDING_SELECTOR: &str = "prometheus=prometheus";
/// Label selecting Prometheus agent ClusterRoleBindings.
pub const PROMETHEUS_AGENT_BINDING_SELECTOR: &str = "name=prometheus-agent";

/// Kinds of object that can be analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalyzeKind {
	Operator,
	Prometheus,
	Alertmanager,
	PrometheusAgent,
	ServiceMonitor,
	Overlapping,
}

impl AnalyzeKind {
	pub const ALL: [Self; 6] = [
		Self::Operator,
		Self::Prometheus,
		Self::Alertmanager,
		Self::PrometheusAgent,
		Self::ServiceMonitor,
		Self::Overlapping,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Operator => "operator",
			Self::Prometheus => "prometheus",
			Self::Alertmanager => "alertmanager",
			Self::PrometheusAgent => "prometheusagent",
			Self::ServiceMonitor => "servicemonitor",
			Self::Overlapping => "overlapping",
		}
	}
}

impl fmt::Display for AnalyzeKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for AnalyzeKind {
	type Err = AnalyzeError;

	/// Kind names are matched case-insensitively.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let lower = s.to_ascii_lowercase();
		Self::ALL
			.into_iter()
			.find(|kind| kind.as_str() == lower)
			.ok_or_else(|| AnalyzeError::UnsupportedKind(s.to_string()))
	}
}

/// The object an analysis is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisTarget {
	pub kind: AnalyzeKind,
	pub name: String,
	pub namespace: String,
}

impl AnalysisTarget {
	/// Build a target from raw user input, rejecting empty fields and unknown
	/// kinds before anything touches the cluster.
	pub fn parse(kind: &str, name: &str, namespace: &str) -> Result<Self, AnalyzeError> {
		if kind.is_empty() {
			return Err(AnalyzeError::MissingArgument("kind"));
		}
		if name.is_empty() {
			return Err(AnalyzeError::MissingArgument("name"));
		}
		if namespace.is_empty() {
			return Err(AnalyzeError::MissingArgument("namespace"));
		}
		let kind = kind.parse()?;

		Ok(Self {
			kind,
			name: name.to_string(),
			namespace: namespace.to_string(),
		})
	}
}

/// Label selectors used to find the ClusterRoleBindings of each workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerSettings {
	pub operator_bindings: String,
	pub prometheus_bindings: String,
	pub prometheus_agent_bindings: String,
}

impl Default for AnalyzerSettings {
	fn default() -> Self {
		Self {
			operator_bindings: OPERATOR_BINDING_SELECTOR.to_string(),
			prometheus_bindings: PROMETHEUS_BINDING_SELECTOR.to_string(),
			prometheus_agent_bindings: PROMETHEUS_AGENT_BINDING_SELECTOR.to_string(),
		}
	}
}

impl AnalyzerSettings {
	/// Apply overrides from a config file on top of the defaults.
	pub fn from_config(config: &PoctlConfig) -> Self {
		let defaults = Self::default();
		let selectors = &config.cluster_role_binding_selectors;
		Self {
			operator_bindings: selectors
				.operator
				.clone()
				.unwrap_or(defaults.operator_bindings),
			prometheus_bindings: selectors
				.prometheus
				.clone()
				.unwrap_or(defaults.prometheus_bindings),
			prometheus_agent_bindings: selectors
				.prometheus_agent
				.clone()
				.unwrap_or(defaults.prometheus_agent_bindings),
		}
	}
}

/// Everything one analysis run needs. Built once and never mutated.
#[derive(Debug, Clone)]
pub struct AnalyzeConfig {
	pub target: AnalysisTarget,
	pub settings: AnalyzerSettings,
	pub timeout: Option<Duration>,
}

/// A check for one kind of target.
pub trait Analyzer {
	fn analyze(
		&self,
		state: &ClusterState,
		target: &AnalysisTarget,
	) -> impl Future<Output = Result<(), AnalyzeError>> + Send;
}

/// Routes a target to the analyzer for its kind.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
	settings: AnalyzerSettings,
}

impl Dispatcher {
	pub fn new(settings: AnalyzerSettings) -> Self {
		Self { settings }
	}

	#[instrument(skip(self, state), fields(kind = %target.kind, name = %target.name, namespace = %target.namespace))]
	pub async fn dispatch(
		&self,
		state: &ClusterState,
		target: &AnalysisTarget,
	) -> Result<(), AnalyzeError> {
		match target.kind {
			AnalyzeKind::Operator => {
				operator::OperatorAnalyzer::new(&self.settings.operator_bindings)
					.analyze(state, target)
					.await
			}
			AnalyzeKind::Prometheus => {
				prometheus::PrometheusAnalyzer::new(&self.settings.prometheus_bindings)
					.analyze(state, target)
					.await
			}
			AnalyzeKind::Alertmanager => {
				alertmanager::AlertmanagerAnalyzer
					.analyze(state, target)
					.await
			}
			AnalyzeKind::PrometheusAgent => {
				prometheus_agent::PrometheusAgentAnalyzer::new(
					&self.settings.prometheus_agent_bindings,
				)
				.analyze(state, target)
				.await
			}
			AnalyzeKind::ServiceMonitor => {
				service_monitor::ServiceMonitorAnalyzer
					.analyze(state, target)
					.await
			}
			AnalyzeKind::Overlapping => overlap::OverlapAnalyzer.analyze(state, target).await,
		}
	}
}

/// Run the analysis described by `config`, bounded by its timeout if any.
pub async fn run(state: &ClusterState, config: &AnalyzeConfig) -> Result<(), AnalyzeError> {
	let dispatcher = Dispatcher::new(config.settings.clone());
	let analysis = dispatcher.dispatch(state, &config.target);

	match config.timeout {
		Some(limit) => tokio::time::timeout(limit, analysis)
			.await
			.map_err(|_| AnalyzeError::TimedOut(limit))?,
		None => analysis.await,
	}
}
