//! Shared types and functions for OpenAI-compatible APIs.
//!
//! Used by the Groq and OpenAI providers and by any self-hosted endpoint
//! that speaks the chat completions format.

use super::{
    ContentBlock, ModelProvider, ProviderMessage, ProviderRequest, ProviderResponse, TokenUsage,
};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

// ============================================================================
// OpenAI-Compatible API Types
// ============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct OpenAiRequest {
    pub model: String,
    pub messages: Vec<ProviderMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiResponse {
    pub choices: Vec<OpenAiChoice>,
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiChoice {
    pub message: OpenAiResponseMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
}

// ============================================================================
// Shared Functions
// ============================================================================

pub(crate) fn build_request(request: ProviderRequest) -> OpenAiRequest {
    OpenAiRequest {
        model: request.model,
        messages: request.messages,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
    }
}

fn parse_response(api_resp: OpenAiResponse) -> Result<ProviderResponse> {
    let choice = api_resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("No choices in response"))?;

    let content = match choice.message.content {
        Some(text) if !text.trim().is_empty() => vec![ContentBlock::Text(text)],
        _ => Vec::new(),
    };

    let usage = api_resp
        .usage
        .map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    Ok(ProviderResponse {
        content,
        stop_reason: choice.finish_reason,
        usage,
    })
}

/// Make a non-streaming chat request to an OpenAI-compatible endpoint.
pub(crate) async fn openai_compat_chat(
    client: &Client,
    base_url: &str,
    api_key: &str,
    request: ProviderRequest,
    provider_name: &str,
) -> Result<ProviderResponse> {
    let body = build_request(request);

    let resp = client
        .post(format!("{}/chat/completions", base_url.trim_end_matches('/')))
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        anyhow::bail!("{} API error ({}): {}", provider_name, status, text);
    }

    let api_resp: OpenAiResponse = resp.json().await?;
    parse_response(api_resp)
}

/// Provider for any endpoint configured under `models.providers` by name.
pub struct OpenAiCompatProvider {
    name: String,
    api_key: String,
    base_url: String,
    client: Client,
}

impl OpenAiCompatProvider {
    pub fn new(name: String, api_key: String, base_url: String, client: Client) -> Self {
        Self {
            name,
            api_key,
            base_url,
            client,
        }
    }
}

#[async_trait]
impl ModelProvider for OpenAiCompatProvider {
    async fn chat(&self, request: ProviderRequest) -> Result<ProviderResponse> {
        openai_compat_chat(
            &self.client,
            &self.base_url,
            &self.api_key,
            request,
            &self.name,
        )
        .await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
