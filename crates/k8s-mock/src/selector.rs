//! Server-side evaluation of `labelSelector` query strings.
//!
//! Supports the same syntax the API server accepts: `k=v`, `k==v`, `k!=v`,
//! `k in (a,b)`, `k notin (a,b)`, `k` and `!k`, joined by commas.

use serde_json::Value;

/// Whether the labels of `manifest` satisfy every term of `selector`.
pub(crate) fn matches(selector: &str, manifest: &Value) -> bool {
	let labels = manifest.pointer("/metadata/labels").and_then(Value::as_object);
	let label = |key: &str| labels.and_then(|l| l.get(key)).and_then(Value::as_str);

	split_terms(selector)
		.into_iter()
		.map(str::trim)
		.filter(|term| !term.is_empty())
		.all(|term| term_matches(term, &label))
}

/// Split on commas that are not inside a `(...)` value set.
fn split_terms(selector: &str) -> Vec<&str> {
	let mut terms = Vec::new();
	let mut depth = 0usize;
	let mut start = 0;

	for (i, c) in selector.char_indices() {
		match c {
			'(' => depth += 1,
			')' => depth = depth.saturating_sub(1),
			',' if depth == 0 => {
				terms.push(&selector[start..i]);
				start = i + 1;
			}
			_ => {}
		}
	}
	terms.push(&selector[start..]);
	terms
}

fn value_set(set: &str) -> Vec<&str> {
	set.trim()
		.trim_start_matches('(')
		.trim_end_matches(')')
		.split(',')
		.map(str::trim)
		.collect()
}

fn term_matches<'a>(term: &str, label: &impl Fn(&str) -> Option<&'a str>) -> bool {
	if let Some((key, set)) = term.split_once(" notin ") {
		return label(key.trim()).is_none_or(|v| !value_set(set).contains(&v));
	}
	if let Some((key, set)) = term.split_once(" in ") {
		return label(key.trim()).is_some_and(|v| value_set(set).contains(&v));
	}
	if let Some((key, value)) = term.split_once("!=") {
		return label(key.trim()) != Some(value.trim());
	}
	if let Some((key, value)) = term.split_once("==").or_else(|| term.split_once('=')) {
		return label(key.trim()) == Some(value.trim());
	}
	if let Some(key) = term.strip_prefix('!') {
		return label(key.trim()).is_none();
	}
	label(term).is_some()
}
