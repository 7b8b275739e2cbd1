//! Runtime settings: API keys, provider priority, phone regions, limits.
//!
//! Everything comes from the environment (a `.env` file is loaded by the
//! binary before this runs). Missing keys disable the corresponding
//! provider rather than failing startup.

use phonenumber::country;
use tracing::warn;

use crate::extract::DEFAULT_PHONE_REGIONS;
use crate::providers::ProviderKind;

/// Multipart upload cap (50 MB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Outbound LLM request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct Settings {
    pub nvidia_api_key: Option<String>,
    pub mistral_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub provider_order: Vec<ProviderKind>,
    pub phone_regions: Vec<country::Id>,
    pub request_timeout_secs: u64,
    pub max_upload_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            nvidia_api_key: None,
            mistral_api_key: None,
            gemini_api_key: None,
            provider_order: ProviderKind::DEFAULT_ORDER.to_vec(),
            phone_regions: DEFAULT_PHONE_REGIONS.to_vec(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Settings {
    /// Load settings from environment variables.
    pub fn from_env() -> Self {
        let mut settings = Self {
            nvidia_api_key: env_value("NVIDIA_API_KEY"),
            mistral_api_key: env_value("MISTRAL_API_KEY"),
            gemini_api_key: env_value("GEMINI_API_KEY"),
            ..Self::default()
        };

        if let Some(order) = env_value("CARDSCAN_PROVIDER_ORDER") {
            settings.provider_order = parse_provider_order(&order);
        }
        if let Some(regions) = env_value("CARDSCAN_PHONE_REGIONS") {
            settings.phone_regions = parse_phone_regions(&regions);
        }
        if let Some(secs) = env_value("CARDSCAN_TIMEOUT_SECS") {
            match secs.parse() {
                Ok(parsed) => settings.request_timeout_secs = parsed,
                Err(_) => warn!("invalid CARDSCAN_TIMEOUT_SECS value: {}", secs),
            }
        }

        settings
    }
}

/// Read an env var, treating empty or whitespace-only values as unset.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a comma-separated provider list, dropping unknowns and duplicates.
fn parse_provider_order(raw: &str) -> Vec<ProviderKind> {
    let mut order = Vec::new();
    for token in raw.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        match ProviderKind::from_str(token) {
            Some(kind) if !order.contains(&kind) => order.push(kind),
            Some(_) => {}
            None => warn!("unknown provider in CARDSCAN_PROVIDER_ORDER: {}", token),
        }
    }
    if order.is_empty() {
        warn!("CARDSCAN_PROVIDER_ORDER had no usable entries, using defaults");
        return ProviderKind::DEFAULT_ORDER.to_vec();
    }
    order
}

/// Parse a comma-separated ISO 3166 region hint list. A region-less parse
/// pass always runs first regardless, so fully qualified +XX numbers resolve
/// even with an aggressive hint list.
fn parse_phone_regions(raw: &str) -> Vec<country::Id> {
    let mut regions = Vec::new();
    for token in raw.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        match region_from_code(token) {
            Some(id) if !regions.contains(&id) => regions.push(id),
            Some(_) => {}
            None => warn!("unknown region in CARDSCAN_PHONE_REGIONS: {}", token),
        }
    }
    if regions.is_empty() {
        warn!("CARDSCAN_PHONE_REGIONS had no usable entries, using defaults");
        return DEFAULT_PHONE_REGIONS.to_vec();
    }
    regions
}

fn region_from_code(code: &str) -> Option<country::Id> {
    match code.to_ascii_uppercase().as_str() {
        "IN" => Some(country::IN),
        "US" => Some(country::US),
        "GB" | "UK" => Some(country::GB),
        "CA" => Some(country::CA),
        "AU" => Some(country::AU),
        "NZ" => Some(country::NZ),
        "DE" => Some(country::DE),
        "FR" => Some(country::FR),
        "SG" => Some(country::SG),
        "AE" => Some(country::AE),
        "ZA" => Some(country::ZA),
        "JP" => Some(country::JP),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_order_drops_unknowns_and_duplicates() {
        let order = parse_provider_order("gemini, nvidia, gemini, llava");
        assert_eq!(order, vec![ProviderKind::Gemini, ProviderKind::Nvidia]);
    }

    #[test]
    fn provider_order_falls_back_when_empty() {
        let order = parse_provider_order(" , llava ,");
        assert_eq!(order, ProviderKind::DEFAULT_ORDER.to_vec());
    }

    #[test]
    fn phone_regions_parse_and_dedup() {
        let regions = parse_phone_regions("us, in, US");
        assert_eq!(regions, vec![country::US, country::IN]);
    }

    #[test]
    fn phone_regions_fall_back_when_empty() {
        let regions = parse_phone_regions("zz");
        assert_eq!(regions, DEFAULT_PHONE_REGIONS.to_vec());
    }
}
