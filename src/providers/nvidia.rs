//! NVIDIA vision provider (OpenAI-compatible chat completions).
//!
//! Uses the NVIDIA integrate API with Phi-3.5 Vision for card parsing.
//! Requires NVIDIA_API_KEY.

use std::path::Path;

use async_trait::async_trait;
use phonenumber::country;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{image_data_url, ProviderError, ProviderKind, VisionProvider};
use crate::extract::{
    normalize_with_regions, recover_json, CardRecord, DEFAULT_PHONE_REGIONS, PROMPT,
};

const DEFAULT_BASE_URL: &str = "https://integrate.api.nvidia.com/v1";
const DEFAULT_MODEL: &str = "microsoft/phi-3.5-vision-instruct";

/// NVIDIA vision provider.
pub struct NvidiaProvider {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    phone_regions: Vec<country::Id>,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ChatContent>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ChatContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: Option<u64>,
}

impl NvidiaProvider {
    /// Create a new NVIDIA provider with an injected HTTP client.
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            phone_regions: DEFAULT_PHONE_REGIONS.to_vec(),
        }
    }

    /// Set the model.
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

        let data_url = image_data_url(image_path, provider)?;
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ChatContent::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                    ChatContent::Text {
                        text: PROMPT.to_string(),
                    },
                ],
            }],
            max_tokens: 1000,
            temperature: 0.1,
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
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
                401 | 403 => ProviderError::AuthFailed {
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

        let chat_response: ChatResponse =
            response.json().await.map_err(|e| ProviderError::Transport {
                provider,
                message: format!("failed to parse response: {}", e),
            })?;

        let text = chat_response
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        let tokens = chat_response.usage.and_then(|u| u.total_tokens);

        Ok((text, tokens))
    }
}

#[async_trait]
impl VisionProvider for NvidiaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Nvidia
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn availability_hint(&self) -> String {
        if self.api_key.is_none() {
            "NVIDIA_API_KEY not set. Get an API key from https://build.nvidia.com/".to_string()
        } else {
            format!("NVIDIA vision is available (model: {})", self.model)
        }
    }

    async fn extract(&self, image_path: &Path) -> Result<CardRecord, ProviderError> {
        debug!("nvidia: extracting from {}", image_path.display());
        let (text, tokens) = self.request_completion(image_path).await?;

        let raw = recover_json(&text).ok_or_else(|| {
            warn!("nvidia: JSON recovery failed");
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
