//! Machine-readable and human-readable analysis results.

use serde::Serialize;

use super::{
	overlap::OverlapFinding, rbac::RbacFinding, AnalysisTarget, AnalyzeError, ErrorClass,
};

/// A structured finding carried by an aggregated error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Finding {
	Rbac(RbacFinding),
	Overlap(OverlapFinding),
}

/// Outcome of one analysis run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
	pub kind: String,
	pub name: String,
	pub namespace: String,
	pub compliant: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error_class: Option<ErrorClass>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	pub findings: Vec<Finding>,
}

impl AnalysisReport {
	pub fn new(target: &AnalysisTarget, result: &Result<(), AnalyzeError>) -> Self {
		let (error_class, message, findings) = match result {
			Ok(()) => (None, None, Vec::new()),
			Err(err) => (Some(err.class()), Some(error_chain(err)), findings_of(err)),
		};

		Self {
			kind: target.kind.to_string(),
			name: target.name.clone(),
			namespace: target.namespace.clone(),
			compliant: result.is_ok(),
			error_class,
			message,
			findings,
		}
	}

	/// Single line summary for text output.
	pub fn summary(&self) -> String {
		match &self.message {
			None => format!(
				"{} {} in namespace {} is compliant, no issues found",
				self.kind, self.name, self.namespace
			),
			Some(message) => message.clone(),
		}
	}
}

fn findings_of(err: &AnalyzeError) -> Vec<Finding> {
	match err {
		AnalyzeError::Rbac(rbac) => rbac.findings.iter().cloned().map(Finding::Rbac).collect(),
		AnalyzeError::Overlap(overlap) => overlap
			.findings
			.iter()
			.cloned()
			.map(Finding::Overlap)
			.collect(),
		_ => Vec::new(),
	}
}

/// Render an error and all of its sources as `outer: inner: ...`.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
	let mut message = err.to_string();
	let mut source = err.source();
	while let Some(cause) = source {
		message.push_str(": ");
		message.push_str(&cause.to_string());
		source = cause.source();
	}
	message
}
