//! Field normalization: raw provider JSON into a canonical card record.
//!
//! Models return loosely-typed shapes: `phoneNumbers` may be a string or a
//! list, `address` may be a string, a list of strings, or a list of
//! vendor-quirk objects keyed by `authorizedDistributor`/`corporateOffice`.
//! Everything collapses here into one uniform record where absence, never
//! emptiness, signals "field not found".

use std::sync::LazyLock;

use phonenumber::{country, Mode};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Region hints tried after region-less parsing, in order. The bias toward
/// IN reflects the deployment's card population; override per deployment via
/// [`normalize_with_regions`] or `CARDSCAN_PHONE_REGIONS`.
pub const DEFAULT_PHONE_REGIONS: &[country::Id] = &[
    country::IN,
    country::US,
    country::GB,
    country::CA,
    country::AU,
];

// Longest alternative first: nothing after the `*` forces backtracking, so
// "mob" must not shadow "mobile".
static PHONE_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:mobile|mob|phone|ph|tel)[:\s]*").unwrap());

static ADDRESS_PHONE_FRAGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:mb|mob|mobile|ph|phone|tel)[:\s]*[\d\s\-+()]{8,}").unwrap()
});

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Canonical record extracted from one business card image.
///
/// Serialization skips absent and empty values, so the wire form never
/// carries a null, empty-string, or empty-list field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phone_numbers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
    pub model: String,
}

/// Normalize raw extracted fields into a [`CardRecord`] using the default
/// phone region hints.
pub fn normalize(raw: &Map<String, Value>, provider: &str, tokens: Option<u64>) -> CardRecord {
    normalize_with_regions(raw, provider, tokens, DEFAULT_PHONE_REGIONS)
}

/// Normalize raw extracted fields with an explicit phone region hint list.
pub fn normalize_with_regions(
    raw: &Map<String, Value>,
    provider: &str,
    tokens: Option<u64>,
    regions: &[country::Id],
) -> CardRecord {
    debug!("normalize: raw data from {} = {:?}", provider, raw);

    let candidates: Vec<String> = match raw.get("phoneNumbers") {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter(|v| !is_falsy(v))
            .map(value_to_string)
            .collect(),
        _ => Vec::new(),
    };

    let phone_numbers: Vec<String> = candidates
        .iter()
        .map(|p| normalize_phone(p, regions))
        .filter(|p| !p.is_empty())
        .collect();

    let address = non_empty(collapse_address(raw.get("address")));

    CardRecord {
        name: text_field(raw, "name"),
        title: text_field(raw, "title"),
        company: text_field(raw, "company"),
        email: text_field(raw, "email"),
        website: text_field(raw, "website"),
        address,
        phone_numbers,
        tokens,
        model: provider.to_string(),
    }
}

/// Canonicalize one phone number candidate.
///
/// Strips a leading label ("mobile:", "ph:", ...), then parses against the
/// region hints: no default region first, then each hint in order. The first
/// region under which the number is *valid* wins and the number is rendered
/// in international display form. If no region works, the trimmed original
/// is kept verbatim so data is never silently dropped.
fn normalize_phone(phone: &str, regions: &[country::Id]) -> String {
    let cleaned = PHONE_LABEL.replace(phone, "");

    let hints = std::iter::once(None).chain(regions.iter().copied().map(Some));
    for region in hints {
        match phonenumber::parse(region, cleaned.as_ref()) {
            Ok(parsed) if phonenumber::is_valid(&parsed) => {
                return parsed.format().mode(Mode::International).to_string();
            }
            Ok(_) | Err(_) => continue,
        }
    }

    debug!("normalize_phone: returning original '{}'", phone.trim());
    phone.trim().to_string()
}

/// Remove phone-like fragments from an address and tidy whitespace and
/// trailing punctuation.
fn clean_address(address: &str) -> String {
    let scrubbed = ADDRESS_PHONE_FRAGMENT.replace_all(address, "");
    let collapsed = WHITESPACE_RUN.replace_all(scrubbed.trim(), " ");
    collapsed.trim_end_matches(['.', ',', ';', ' ']).to_string()
}

/// Collapse the variant address shapes into a single cleaned string.
fn collapse_address(addr: Option<&Value>) -> String {
    match addr {
        Some(Value::String(s)) => clean_address(s),
        Some(Value::Array(items)) => {
            // Vendor quirk: some models emit a list of labeled office objects.
            if let Some(Value::Object(first)) = items.first() {
                let dist = first
                    .get("authorizedDistributor")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .trim();
                let corp = first
                    .get("corporateOffice")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .trim();
                clean_address(if dist.is_empty() { corp } else { dist })
            } else {
                let parts: Vec<String> = items
                    .iter()
                    .filter(|v| !is_falsy(v))
                    .map(|v| clean_address(value_to_string(v).trim()))
                    .filter(|s| !s.is_empty())
                    .collect();
                parts.join(" | ")
            }
        }
        Some(Value::Null) | None => String::new(),
        Some(other) => clean_address(value_to_string(other).trim()),
    }
}

fn text_field(raw: &Map<String, Value>, key: &str) -> Option<String> {
    let value = raw.get(key)?;
    if is_falsy(value) {
        return None;
    }
    non_empty(value_to_string(value).trim().to_string())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> Map<String, Value> {
        value
            .as_object()
            .expect("test input must be an object")
            .clone()
    }

    fn assert_no_empty_values(record: &CardRecord) {
        let value = serde_json::to_value(record).expect("record serializes");
        for (key, v) in value.as_object().expect("record is an object") {
            assert!(!v.is_null(), "{key} is null");
            if let Some(s) = v.as_str() {
                assert!(!s.trim().is_empty(), "{key} is an empty string");
            }
            if let Some(a) = v.as_array() {
                assert!(!a.is_empty(), "{key} is an empty list");
            }
        }
    }

    #[test]
    fn empty_input_yields_empty_record() {
        let record = normalize(&Map::new(), "gemini", None);
        assert_eq!(record.model, "gemini");
        assert!(record.name.is_none());
        assert!(record.phone_numbers.is_empty());
        assert_no_empty_values(&record);
    }

    #[test]
    fn null_and_empty_fields_are_elided() {
        let record = normalize(
            &raw(json!({
                "name": "Jane Roe",
                "title": null,
                "company": "",
                "email": "   ",
                "phoneNumbers": [],
            })),
            "nvidia",
            Some(120),
        );
        assert_eq!(record.name.as_deref(), Some("Jane Roe"));
        assert!(record.title.is_none());
        assert!(record.company.is_none());
        assert!(record.email.is_none());
        assert_eq!(record.tokens, Some(120));
        assert_no_empty_values(&record);
    }

    #[test]
    fn lone_phone_string_is_wrapped_and_formatted() {
        let record = normalize(
            &raw(json!({"phoneNumbers": "+1 415-555-0100"})),
            "nvidia",
            None,
        );
        assert_eq!(record.phone_numbers.len(), 1);
        assert!(record.phone_numbers[0].starts_with("+1"));
    }

    #[test]
    fn labeled_phone_is_stripped_and_parsed() {
        let record = normalize(
            &raw(json!({"phoneNumbers": ["Mobile: +44 20 7946 0958"]})),
            "nvidia",
            None,
        );
        assert_eq!(record.phone_numbers.len(), 1);
        assert!(
            record.phone_numbers[0].starts_with("+44"),
            "label should be stripped before parsing: {:?}",
            record.phone_numbers[0]
        );
    }

    #[test]
    fn unparsable_phone_is_kept_verbatim() {
        let record = normalize(&raw(json!({"phoneNumbers": " not a number "})), "nvidia", None);
        assert_eq!(record.phone_numbers, vec!["not a number".to_string()]);
    }

    #[test]
    fn falsy_phone_entries_are_dropped() {
        let record = normalize(
            &raw(json!({"phoneNumbers": [null, "", "not a number"]})),
            "mistral",
            None,
        );
        assert_eq!(record.phone_numbers, vec!["not a number".to_string()]);
    }

    #[test]
    fn address_list_scrubs_phone_fragments() {
        let record = normalize(
            &raw(json!({"address": ["mob: 9876543210", "123 Main St"]})),
            "gemini",
            None,
        );
        assert_eq!(record.address.as_deref(), Some("123 Main St"));
    }

    #[test]
    fn address_string_scrubs_inline_phone() {
        let record = normalize(
            &raw(json!({"address": "42 Baker Street, London  Tel: +44 (0)20 1234 5678 ,"})),
            "gemini",
            None,
        );
        assert_eq!(record.address.as_deref(), Some("42 Baker Street, London"));
    }

    #[test]
    fn distributor_object_address_prefers_distributor() {
        let record = normalize(
            &raw(json!({"address": [{"authorizedDistributor": "X Corp, NY"}]})),
            "gemini",
            None,
        );
        assert_eq!(record.address.as_deref(), Some("X Corp, NY"));
    }

    #[test]
    fn distributor_object_address_falls_back_to_corporate_office() {
        let record = normalize(
            &raw(json!({"address": [{"authorizedDistributor": "", "corporateOffice": "1 HQ Plaza"}]})),
            "gemini",
            None,
        );
        assert_eq!(record.address.as_deref(), Some("1 HQ Plaza"));
    }

    #[test]
    fn plain_string_list_address_is_joined() {
        let record = normalize(
            &raw(json!({"address": ["Unit 4", "Industrial Estate"]})),
            "gemini",
            None,
        );
        assert_eq!(record.address.as_deref(), Some("Unit 4 | Industrial Estate"));
    }

    #[test]
    fn scalar_and_null_address_shapes() {
        let record = normalize(&raw(json!({"address": 42})), "gemini", None);
        assert_eq!(record.address.as_deref(), Some("42"));

        let record = normalize(&raw(json!({"address": null})), "gemini", None);
        assert!(record.address.is_none());
    }

    #[test]
    fn normalize_is_idempotent_on_its_own_output() {
        let first = normalize(
            &raw(json!({
                "name": "Jane Roe",
                "title": "Director",
                "company": "Acme Pvt Ltd",
                "email": "jane@acme.example",
                "website": "acme.example",
                "address": ["mob: 9876543210", "12 MG Road, Bengaluru"],
                "phoneNumbers": ["ph: +91 98765 43210", "not a number"],
            })),
            "nvidia",
            Some(512),
        );
        assert_no_empty_values(&first);

        let reserialized = serde_json::to_value(&first).expect("record serializes");
        let second = normalize(
            reserialized.as_object().expect("record is an object"),
            &first.model,
            first.tokens,
        );
        assert_eq!(first, second);
    }
}
