use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use super::{overlap::OverlapFindings, rbac::RbacFindings, selector::SelectorError};
use crate::k8s::AccessError;

/// Coarse classification of an analysis failure, stable across messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorClass {
	InvalidArgument,
	UnsupportedKind,
	NotFound,
	Access,
	Selector,
	NoMatch,
	RbacFinding,
	OverlapFinding,
	Compliance,
	Cancelled,
	TimedOut,
}

/// Errors returned by an analysis run.
///
/// Messages of compliance failures are meant to be read by operators of the
/// cluster and say what is wrong with which object.
#[derive(Debug, Error)]
pub enum AnalyzeError {
	#[error("{0} is required")]
	MissingArgument(&'static str),

	#[error("kind {0} not supported")]
	UnsupportedKind(String),

	#[error(transparent)]
	Access(#[from] AccessError),

	#[error("{field} is not properly defined")]
	Selector {
		field: &'static str,
		#[source]
		source: SelectorError,
	},

	#[error("serviceAccount {0} is not bound to any ClusterRoleBinding")]
	ServiceAccountNotBound(String),

	#[error(transparent)]
	Rbac(#[from] RbacFindings),

	#[error("ClusterRole {0} does not have monitoring.coreos.com APIGroup in its rules")]
	MissingMonitoringApiGroup(String),

	#[error("ClusterRole {role} does not have {crd} in its rules")]
	MissingCrd { role: String, crd: String },

	#[error(transparent)]
	Overlap(#[from] OverlapFindings),

	#[error("ServiceMonitor {name} in namespace {namespace} does not have a selector")]
	MissingSelector { name: String, namespace: String },

	#[error("ServiceMonitor {name} in namespace {namespace} has an invalid selector")]
	InvalidSelector {
		name: String,
		namespace: String,
		#[source]
		source: SelectorError,
	},

	#[error("ServiceMonitor {name} in namespace {namespace} has no services matching the selector")]
	NoMatchingServices { name: String, namespace: String },

	#[error("ServiceMonitor {name} in namespace {namespace} has no services with port {port}")]
	MissingServicePort {
		name: String,
		namespace: String,
		port: String,
	},

	#[error("alertmanager Secret {0} is empty")]
	EmptySecret(String),

	#[error("the {key} key not found in Secret {secret}")]
	MissingSecretKey { key: String, secret: String },

	#[error("background task failed")]
	TaskFailed(#[source] tokio::task::JoinError),

	#[error("analysis cancelled")]
	Cancelled,

	#[error("analysis timed out after {}s", .0.as_secs())]
	TimedOut(Duration),
}

impl AnalyzeError {
	pub fn class(&self) -> ErrorClass {
		match self {
			Self::MissingArgument(_) => ErrorClass::InvalidArgument,
			Self::UnsupportedKind(_) => ErrorClass::UnsupportedKind,
			Self::Access(err) => access_class(err),
			Self::Selector { source, .. } => match source {
				SelectorError::Access(err) => access_class(err),
				err if err.is_no_match() => ErrorClass::NoMatch,
				_ => ErrorClass::Selector,
			},
			Self::Rbac(_) => ErrorClass::RbacFinding,
			Self::Overlap(_) => ErrorClass::OverlapFinding,
			Self::MissingSelector { .. } | Self::InvalidSelector { .. } => ErrorClass::Selector,
			Self::NoMatchingServices { .. } => ErrorClass::NoMatch,
			Self::ServiceAccountNotBound(_)
			| Self::MissingMonitoringApiGroup(_)
			| Self::MissingCrd { .. }
			| Self::MissingServicePort { .. }
			| Self::EmptySecret(_)
			| Self::MissingSecretKey { .. } => ErrorClass::Compliance,
			Self::TaskFailed(_) => ErrorClass::Access,
			Self::Cancelled => ErrorClass::Cancelled,
			Self::TimedOut(_) => ErrorClass::TimedOut,
		}
	}
}

fn access_class(err: &AccessError) -> ErrorClass {
	if err.is_not_found() {
		ErrorClass::NotFound
	} else {
		ErrorClass::Access
	}
}
