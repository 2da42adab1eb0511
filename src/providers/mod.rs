mod groq;
mod openai;
pub(crate) mod openai_compat;

pub use groq::GroqProvider;
pub use openai::OpenAiProvider;
pub use openai_compat::OpenAiCompatProvider;

use crate::config::{Config, GROQ_BASE_URL, OPENAI_BASE_URL};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

// ============================================================================
// Provider Types
// ============================================================================

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMessage {
    pub role: String,
    pub content: String,
}

impl ProviderMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A request to a model provider.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub model: String,
    pub messages: Vec<ProviderMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

/// A response from a model provider.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
    pub usage: TokenUsage,
}

impl ProviderResponse {
    pub fn content_text(&self) -> String {
        self.content
            .iter()
            .map(|b| match b {
                ContentBlock::Text(t) => t.as_str(),
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// A content block in a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContentBlock {
    Text(String),
}

// ============================================================================
// Provider Trait
// ============================================================================

#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn chat(&self, request: ProviderRequest) -> Result<ProviderResponse>;
    fn name(&self) -> &str;
}

// ============================================================================
// Provider Resolution
// ============================================================================

/// Build the provider named by `analysis.provider`.
///
/// `Ok(None)` when no API key is configured for it; the analysis scheduler
/// then broadcasts its fallback text instead of calling out.
pub fn resolve_provider(config: &Config) -> Result<Option<Arc<dyn ModelProvider>>> {
    let name = config.analysis.provider.as_str();
    let entry = config.models.providers.get(name);

    let api_key = match entry.and_then(|p| p.api_key.clone()) {
        Some(key) if !key.is_empty() => key,
        _ => {
            warn!("No API key configured for analysis provider '{}'", name);
            return Ok(None);
        }
    };

    let timeout = Duration::from_secs(config.analysis.request_timeout_secs);
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")?;

    let provider: Arc<dyn ModelProvider> = match name {
        "groq" => {
            let base_url = entry
                .map(|p| p.base_url.clone())
                .unwrap_or_else(|| GROQ_BASE_URL.to_string());
            Arc::new(GroqProvider::new(api_key, base_url, client))
        }
        "openai" => {
            let base_url = entry
                .map(|p| p.base_url.clone())
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string());
            Arc::new(OpenAiProvider::new(api_key, base_url, client))
        }
        other => {
            let Some(base_url) = entry.map(|p| p.base_url.clone()) else {
                anyhow::bail!("Provider '{}' has no baseUrl", other);
            };
            Arc::new(OpenAiCompatProvider::new(
                other.to_string(),
                api_key,
                base_url,
                client,
            ))
        }
    };

    info!(
        "Analysis provider: {} (model {})",
        provider.name(),
        config.analysis.model
    );
    Ok(Some(provider))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelProviderConfig;

    #[test]
    fn missing_key_resolves_to_none() {
        let config = Config::default();
        assert!(resolve_provider(&config).unwrap().is_none());
    }

    #[test]
    fn known_and_custom_providers_resolve() {
        let mut config = Config::default();
        config.models.apply_groq_key("gsk_test");
        let provider = resolve_provider(&config).unwrap().unwrap();
        assert_eq!(provider.name(), "groq");

        config.analysis.provider = "local".to_string();
        config.models.providers.insert(
            "local".to_string(),
            ModelProviderConfig {
                base_url: "http://127.0.0.1:8000/v1".to_string(),
                api_key: Some("none".to_string()),
            },
        );
        let provider = resolve_provider(&config).unwrap().unwrap();
        assert_eq!(provider.name(), "local");
    }

    #[test]
    fn content_text_joins_blocks() {
        let resp = ProviderResponse {
            content: vec![
                ContentBlock::Text("Air ".to_string()),
                ContentBlock::Text("is clean.".to_string()),
            ],
            stop_reason: Some("stop".to_string()),
            usage: TokenUsage::default(),
        };
        assert_eq!(resp.content_text(), "Air is clean.");
    }
}
