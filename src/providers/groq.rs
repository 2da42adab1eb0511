use super::openai_compat;
use super::*;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;

pub struct GroqProvider {
    api_key: String,
    base_url: String,
    client: Client,
}

impl GroqProvider {
    pub fn new(api_key: String, base_url: String, client: Client) -> Self {
        Self {
            api_key,
            base_url,
            client,
        }
    }
}

#[async_trait]
impl ModelProvider for GroqProvider {
    async fn chat(&self, request: ProviderRequest) -> Result<ProviderResponse> {
        openai_compat::openai_compat_chat(
            &self.client,
            &self.base_url,
            &self.api_key,
            request,
            "Groq",
        )
        .await
    }

    fn name(&self) -> &str {
        "groq"
    }
}
