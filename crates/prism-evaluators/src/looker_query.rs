//! Checks that the agent's reply contains a structured Looker query matching
//! the expected shape. The query is pulled out of free-form text: a fenced
//! ```json block wins, otherwise the first balanced JSON object that looks
//! like a query is used.

use async_trait::async_trait;
use prism_core::errors::EvalError;
use prism_core::evaluate::Evaluator;
use prism_core::model::{
    AssertionResult, AssertionSnapshot, AssertionSpec, QueryFilter, TrialOutput,
};
use serde::Deserialize;
use serde_json::Value;

pub struct LookerQueryMatchEvaluator;

#[derive(Debug, Deserialize)]
struct ExtractedQuery {
    model: Option<String>,
    explore: Option<String>,
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    filters: Value,
    #[serde(default)]
    sorts: Vec<String>,
    #[serde(default)]
    limit: Option<u64>,
}

#[async_trait]
impl Evaluator for LookerQueryMatchEvaluator {
    fn kind(&self) -> &'static str {
        "looker_query_match"
    }

    async fn evaluate(
        &self,
        assertion: &AssertionSnapshot,
        output: &TrialOutput,
    ) -> Result<AssertionResult, EvalError> {
        let AssertionSpec::LookerQueryMatch {
            model,
            explore,
            fields,
            filters,
            sorts,
            limit,
        } = &assertion.spec
        else {
            return Ok(AssertionResult {
                assertion_id: assertion.id,
                passed: false,
                score: 0.0,
                message: format!(
                    "evaluator dispatched with mismatched spec kind '{}'",
                    assertion.spec.kind()
                ),
            });
        };

        let Some(query) = extract_query(&output.text) else {
            return Ok(AssertionResult {
                assertion_id: assertion.id,
                passed: false,
                score: 0.0,
                message: "no structured query found in output".into(),
            });
        };

        let mut mismatches = Vec::new();
        if query.model.as_deref() != Some(model.as_str()) {
            mismatches.push("model");
        }
        if query.explore.as_deref() != Some(explore.as_str()) {
            mismatches.push("explore");
        }
        // Fields and filters are order-independent; sorts are positional
        // because sort order changes query semantics.
        if !same_unordered(fields, &query.fields) {
            mismatches.push("fields");
        }
        let mut expected_filters: Vec<QueryFilter> = filters.clone();
        expected_filters.sort();
        let mut actual_filters = normalize_filters(&query.filters);
        actual_filters.sort();
        if expected_filters != actual_filters {
            mismatches.push("filters");
        }
        if sorts != &query.sorts {
            mismatches.push("sorts");
        }
        if limit != &query.limit {
            mismatches.push("limit");
        }

        let passed = mismatches.is_empty();
        Ok(AssertionResult {
            assertion_id: assertion.id,
            passed,
            score: if passed { 1.0 } else { 0.0 },
            message: if passed {
                "query matches expected shape".into()
            } else {
                format!("query mismatch: {}", mismatches.join(", "))
            },
        })
    }
}

fn same_unordered(expected: &[String], actual: &[String]) -> bool {
    let mut a = expected.to_vec();
    let mut b = actual.to_vec();
    a.sort();
    b.sort();
    a == b
}

/// Accepts both filter encodings agents emit: a `{"field": "value"}` map and
/// a list of `{"field": ..., "value": ...}` objects.
fn normalize_filters(value: &Value) -> Vec<QueryFilter> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(field, v)| QueryFilter {
                field: field.clone(),
                value: scalar_to_string(v),
            })
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let field = item.get("field")?.as_str()?.to_string();
                let value = scalar_to_string(item.get("value")?);
                Some(QueryFilter { field, value })
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn scalar_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn extract_query(text: &str) -> Option<ExtractedQuery> {
    for candidate in json_candidates(text) {
        let Ok(value) = serde_json::from_str::<Value>(candidate) else {
            continue;
        };
        let looks_like_query = value.get("model").is_some()
            || value.get("explore").is_some()
            || value.get("fields").is_some();
        if !looks_like_query {
            continue;
        }
        if let Ok(query) = serde_json::from_value(value) {
            return Some(query);
        }
    }
    None
}

fn json_candidates(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    if let Some(start) = text.find("```json") {
        let body = &text[start + "```json".len()..];
        if let Some(end) = body.find("```") {
            out.push(body[..end].trim());
        }
    }
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(len) = balanced_object_len(&text[i..]) {
                out.push(&text[i..i + len]);
                i += len;
                continue;
            }
        }
        i += 1;
    }
    out
}

/// Length of the balanced object starting at the first byte of `s`, which
/// must be '{'. String literals and escapes are skipped so braces inside
/// values do not confuse the depth count.
fn balanced_object_len(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, c) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}
