//! Vision provider abstraction for card extraction.
//!
//! Each provider wraps one externally hosted vision-capable model behind a
//! uniform contract: submit an image plus the shared prompt, get back a
//! normalized [`CardRecord`] or a classified [`ProviderError`]. Failures are
//! always converted to values at this boundary; nothing here panics or lets a
//! transport error escape as anything other than a `ProviderError`.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

mod gemini;
mod mistral;
mod nvidia;

pub use gemini::GeminiProvider;
pub use mistral::MistralProvider;
pub use nvidia::NvidiaProvider;

use crate::extract::CardRecord;

/// Available vision providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// NVIDIA-hosted OpenAI-compatible endpoint (Phi-3.5 Vision).
    Nvidia,
    /// Mistral multimodal chat endpoint.
    Mistral,
    /// Google Gemini generateContent endpoint.
    Gemini,
}

impl ProviderKind {
    /// Fixed default trial order for the fallback dispatcher.
    pub const DEFAULT_ORDER: &'static [ProviderKind] = &[
        ProviderKind::Nvidia,
        ProviderKind::Mistral,
        ProviderKind::Gemini,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Nvidia => "nvidia",
            ProviderKind::Mistral => "mistral",
            ProviderKind::Gemini => "gemini",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "nvidia" => Some(ProviderKind::Nvidia),
            "mistral" => Some(ProviderKind::Mistral),
            "gemini" => Some(ProviderKind::Gemini),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classifiable failure reasons, aggregated by the dispatcher when every
/// provider fails. The string forms are stable identifiers the transport
/// layer substring-matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorTag {
    AuthFailed,
    QuotaExceeded,
}

impl ErrorTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorTag::AuthFailed => "auth_failed",
            ErrorTag::QuotaExceeded => "quota_exceeded",
        }
    }
}

impl std::fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors from provider adapters.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider rejected our credentials (401/403, invalid key).
    #[error("{provider}: authorization failed: {message}")]
    AuthFailed { provider: ProviderKind, message: String },

    /// The provider rate-limited or quota-limited the request (429).
    #[error("{provider}: quota exceeded: {message}")]
    QuotaExceeded { provider: ProviderKind, message: String },

    /// No JSON object could be recovered from the model output.
    #[error("{provider}: could not recover JSON from model output")]
    InvalidResponse { provider: ProviderKind },

    /// Network, decode, or any other SDK-level failure.
    #[error("{provider}: transport error: {message}")]
    Transport { provider: ProviderKind, message: String },

    /// The adapter has no API key configured.
    #[error("{provider} not configured: {hint}")]
    NotConfigured { provider: ProviderKind, hint: String },
}

impl ProviderError {
    /// Tag recorded in the dispatcher's error set. `None` for ordinary
    /// failures, which just move the dispatcher along to the next provider.
    pub fn tag(&self) -> Option<ErrorTag> {
        match self {
            ProviderError::AuthFailed { .. } => Some(ErrorTag::AuthFailed),
            ProviderError::QuotaExceeded { .. } => Some(ErrorTag::QuotaExceeded),
            _ => None,
        }
    }
}

/// Trait for vision extraction providers.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Which provider this is.
    fn kind(&self) -> ProviderKind;

    /// Check if this provider is usable (API key configured).
    fn is_available(&self) -> bool;

    /// Get a description of what's needed to make this provider available.
    fn availability_hint(&self) -> String;

    /// Extract a card record from an image file.
    async fn extract(&self, image_path: &Path) -> Result<CardRecord, ProviderError>;
}

/// Read an image file and encode it as a base64 data URL. Mime type is
/// guessed from the extension; JPEG is the default.
pub(crate) fn image_data_url(path: &Path, provider: ProviderKind) -> Result<String, ProviderError> {
    use base64::Engine;

    let bytes = std::fs::read(path).map_err(|e| ProviderError::Transport {
        provider,
        message: format!("failed to read {}: {}", path.display(), e),
    })?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Ok(format!("data:{};base64,{}", image_mime(path), encoded))
}

/// Read an image file and return (mime type, raw base64) for providers that
/// take inline data instead of data URLs.
pub(crate) fn image_inline_data(
    path: &Path,
    provider: ProviderKind,
) -> Result<(&'static str, String), ProviderError> {
    use base64::Engine;

    let bytes = std::fs::read(path).map_err(|e| ProviderError::Transport {
        provider,
        message: format!("failed to read {}: {}", path.display(), e),
    })?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Ok((image_mime(path), encoded))
}

fn image_mime(path: &Path) -> &'static str {
    if path.extension().map(|e| e == "png").unwrap_or(false) {
        "image/png"
    } else {
        "image/jpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_strings() {
        for kind in ProviderKind::DEFAULT_ORDER {
            assert_eq!(ProviderKind::from_str(kind.as_str()), Some(*kind));
        }
        assert_eq!(ProviderKind::from_str("GEMINI"), Some(ProviderKind::Gemini));
        assert_eq!(ProviderKind::from_str("auto"), None);
    }

    #[test]
    fn only_auth_and_quota_errors_carry_tags() {
        let auth = ProviderError::AuthFailed {
            provider: ProviderKind::Nvidia,
            message: "403".into(),
        };
        let quota = ProviderError::QuotaExceeded {
            provider: ProviderKind::Gemini,
            message: "429".into(),
        };
        let invalid = ProviderError::InvalidResponse {
            provider: ProviderKind::Mistral,
        };
        assert_eq!(auth.tag(), Some(ErrorTag::AuthFailed));
        assert_eq!(quota.tag(), Some(ErrorTag::QuotaExceeded));
        assert_eq!(invalid.tag(), None);
    }

    #[test]
    fn tags_sort_deterministically() {
        let mut tags = vec![ErrorTag::QuotaExceeded, ErrorTag::AuthFailed];
        tags.sort();
        let joined = tags
            .iter()
            .map(ErrorTag::as_str)
            .collect::<Vec<_>>()
            .join(",");
        assert_eq!(joined, "auth_failed,quota_exceeded");
    }
}
