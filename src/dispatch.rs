//! Fallback dispatcher: tries vision providers in order until one succeeds.
//!
//! The set of enabled providers and their priority is configuration, not a
//! code path: the dispatcher holds an injected ordered list of adapters. A
//! caller preference moves that provider to the front of the trial order;
//! "auto" or unknown preferences use the configured order outright.
//!
//! First success wins. Classifiable failures (auth, quota) accumulate in a
//! deduplicated tag set so that when *every* provider fails the caller can
//! tell "the deployment is misconfigured" apart from "the providers ran but
//! could not read this image".

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::extract::CardRecord;
use crate::providers::{
    ErrorTag, GeminiProvider, MistralProvider, NvidiaProvider, ProviderKind, VisionProvider,
};

/// Returned marker when no provider was ever tried.
const FAILED_MARKER: &str = "failed";

/// Outcome of one dispatch call.
///
/// `provider` is the succeeding provider's name, or on terminal failure
/// either the sorted comma-joined set of error tags (when failures were
/// classifiable) or the last provider tried.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub record: Option<CardRecord>,
    pub provider: String,
}

impl DispatchResult {
    pub fn is_success(&self) -> bool {
        self.record.is_some()
    }
}

/// Ordered fallback chain of vision providers.
pub struct Dispatcher {
    providers: Vec<Arc<dyn VisionProvider>>,
}

impl Dispatcher {
    /// Create a dispatcher from an ordered list of adapters, dropping any
    /// that are not usable (missing API key).
    pub fn new(providers: Vec<Arc<dyn VisionProvider>>) -> Self {
        let mut available = Vec::new();
        for provider in providers {
            if provider.is_available() {
                debug!("dispatch: added {} provider", provider.kind());
                available.push(provider);
            } else {
                warn!(
                    "dispatch: {} not available ({})",
                    provider.kind(),
                    provider.availability_hint()
                );
            }
        }
        info!(
            "dispatch: chain initialized with {} providers",
            available.len()
        );
        Self {
            providers: available,
        }
    }

    /// Assemble the dispatcher from settings: one shared HTTP client, one
    /// adapter per provider, in the configured priority order.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        let providers = settings
            .provider_order
            .iter()
            .map(|kind| -> Arc<dyn VisionProvider> {
                match kind {
                    ProviderKind::Nvidia => Arc::new(
                        NvidiaProvider::new(client.clone(), settings.nvidia_api_key.clone())
                            .with_phone_regions(settings.phone_regions.clone()),
                    ),
                    ProviderKind::Mistral => Arc::new(
                        MistralProvider::new(client.clone(), settings.mistral_api_key.clone())
                            .with_phone_regions(settings.phone_regions.clone()),
                    ),
                    ProviderKind::Gemini => Arc::new(
                        GeminiProvider::new(client.clone(), settings.gemini_api_key.clone())
                            .with_phone_regions(settings.phone_regions.clone()),
                    ),
                }
            })
            .collect();

        Ok(Self::new(providers))
    }

    /// Providers in the chain, in configured order.
    pub fn providers(&self) -> impl Iterator<Item = &dyn VisionProvider> {
        self.providers.iter().map(|p| p.as_ref())
    }

    /// Check if the chain has any usable providers.
    pub fn has_providers(&self) -> bool {
        !self.providers.is_empty()
    }

    /// Trial order for a caller preference: the preferred provider first,
    /// then the remaining chain in configured order.
    fn trial_order(&self, preferred: &str) -> Vec<Arc<dyn VisionProvider>> {
        let preferred_kind = ProviderKind::from_str(preferred);
        let mut order: Vec<Arc<dyn VisionProvider>> = Vec::with_capacity(self.providers.len());

        if let Some(kind) = preferred_kind {
            if let Some(first) = self.providers.iter().find(|p| p.kind() == kind) {
                order.push(Arc::clone(first));
            }
        }
        for provider in &self.providers {
            if order.iter().all(|p| p.kind() != provider.kind()) {
                order.push(Arc::clone(provider));
            }
        }
        order
    }

    /// Extract a card record from one image, trying providers in order.
    pub async fn extract_one(&self, image_path: &Path, preferred: &str) -> DispatchResult {
        info!(
            "dispatch: preferred={}, image={}",
            preferred,
            image_path.display()
        );

        let mut tags: BTreeSet<ErrorTag> = BTreeSet::new();
        let mut last_tried = FAILED_MARKER.to_string();

        for provider in self.trial_order(preferred) {
            last_tried = provider.kind().to_string();
            info!("dispatch: trying {} for {}", last_tried, image_path.display());

            match provider.extract(image_path).await {
                Ok(record) => {
                    info!(
                        "dispatch: {} succeeded for {}",
                        last_tried,
                        image_path.display()
                    );
                    return DispatchResult {
                        record: Some(record),
                        provider: last_tried,
                    };
                }
                Err(e) => {
                    if let Some(tag) = e.tag() {
                        warn!("dispatch: {} returned error flag {}", last_tried, tag);
                        tags.insert(tag);
                    } else {
                        warn!("dispatch: {} failed: {}", last_tried, e);
                    }
                }
            }
        }

        error!("dispatch: all providers failed for {}", image_path.display());

        if !tags.is_empty() {
            let joined = tags
                .iter()
                .map(ErrorTag::as_str)
                .collect::<Vec<_>>()
                .join(",");
            return DispatchResult {
                record: None,
                provider: joined,
            };
        }

        DispatchResult {
            record: None,
            provider: last_tried,
        }
    }
}
