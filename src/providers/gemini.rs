//! Google Gemini vision provider (generateContent).
//!
//! Asks for `application/json` output directly; the JSON recovery pass still
//! runs since Gemini occasionally fences the payload anyway.
//! Requires GEMINI_API_KEY. Invalid keys surface as HTTP 400 on this
//! endpoint, so 400 is classified as an auth failure alongside 401/403.

use std::path::Path;

use async_trait::async_trait;
use phonenumber::country;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{image_inline_data, ProviderError, ProviderKind, VisionProvider};
use crate::extract::{
    normalize_with_regions, recover_json, CardRecord, DEFAULT_PHONE_REGIONS, PROMPT,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Gemini vision provider.
pub struct GeminiProvider {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    phone_regions: Vec<country::Id>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "totalTokenCount")]
    total_token_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl GeminiProvider {
    /// Create a new Gemini provider with an injected HTTP client.
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            phone_regions: DEFAULT_PHONE_REGIONS.to_vec(),
        }
    }

    /// Set the model (e.g., "gemini-2.5-flash", "gemini-1.5-pro").
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the provider at a different base URL (for testing with wiremock).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the phone region hints used during normalization.
    pub fn with_phone_regions(mut self, regions: Vec<country::Id>) -> Self {
        self.phone_regions = regions;
        self
    }

    async fn request_completion(
        &self,
        image_path: &Path,
    ) -> Result<(String, Option<u64>), ProviderError> {
        let provider = self.kind();
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ProviderError::NotConfigured {
                provider,
                hint: self.availability_hint(),
            })?;

        let (mime_type, data) = image_inline_data(image_path, provider)?;
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text {
                        text: PROMPT.to_string(),
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: mime_type.to_string(),
                            data,
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                temperature: 0.1,
            },
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            api_key
        );
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                provider,
                message: format!("HTTP request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                // Gemini reports invalid keys as 400 INVALID_ARGUMENT.
                400 | 401 | 403 => ProviderError::AuthFailed {
                    provider,
                    message: format!("{}: {}", status, body),
                },
                429 => ProviderError::QuotaExceeded {
                    provider,
                    message: format!("{}: {}", status, body),
                },
                _ => ProviderError::Transport {
                    provider,
                    message: format!("API error ({}): {}", status, body),
                },
            });
        }

        let generate_response: GenerateResponse =
            response.json().await.map_err(|e| ProviderError::Transport {
                provider,
                message: format!("failed to parse response: {}", e),
            })?;

        if let Some(error) = generate_response.error {
            return Err(ProviderError::Transport {
                provider,
                message: format!("API error: {}", error.message),
            });
        }

        let text = generate_response
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content.parts.into_iter().next())
            .and_then(|p| p.text)
            .unwrap_or_default();
        let tokens = generate_response
            .usage_metadata
            .and_then(|u| u.total_token_count);

        Ok((text, tokens))
    }
}

#[async_trait]
impl VisionProvider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn availability_hint(&self) -> String {
        if self.api_key.is_none() {
            "GEMINI_API_KEY not set. Get an API key from https://ai.google.dev/".to_string()
        } else {
            format!("Gemini vision is available (model: {})", self.model)
        }
    }

    async fn extract(&self, image_path: &Path) -> Result<CardRecord, ProviderError> {
        debug!("gemini: extracting from {}", image_path.display());
        let (text, tokens) = self.request_completion(image_path).await?;

        let raw = recover_json(&text).ok_or_else(|| {
            warn!("gemini: JSON recovery failed");
            ProviderError::InvalidResponse {
                provider: self.kind(),
            }
        })?;

        Ok(normalize_with_regions(
            &raw,
            self.kind().as_str(),
            tokens,
            &self.phone_regions,
        ))
    }
}
