//! Tolerant JSON recovery from model output.
//!
//! Vision models are told to return bare JSON but frequently wrap it in
//! markdown code fences or surround it with commentary. Rather than discard
//! an otherwise-valid extraction over formatting noise, multiple recovery
//! strategies are tried in order.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```(?:json)?\s*(.+?)```").unwrap());
static BRACE_SPAN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Recover a JSON object from arbitrary model output.
///
/// Strategies, first success wins:
/// 1. direct parse of the trimmed text;
/// 2. contents of the first fenced code block;
/// 3. the first greedy `{` … `}` span.
///
/// Returns `None` when no strategy yields a JSON *object*; the caller treats
/// that as an extraction failure for the provider, not a fatal error.
pub fn recover_json(text: &str) -> Option<Map<String, Value>> {
    let text = text.trim();
    debug!("recover_json: raw text snippet = {:.200}", text);

    if let Some(obj) = parse_object(text) {
        return Some(obj);
    }

    if let Some(captures) = FENCED_BLOCK.captures(text) {
        if let Some(obj) = captures.get(1).and_then(|m| parse_object(m.as_str().trim())) {
            return Some(obj);
        }
        debug!("recover_json: fenced block parse failed");
    }

    if let Some(span) = BRACE_SPAN.find(text) {
        if let Some(obj) = parse_object(span.as_str()) {
            return Some(obj);
        }
        debug!("recover_json: curly brace block parse failed");
    }

    warn!("recover_json: could not find valid JSON");
    None
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}
