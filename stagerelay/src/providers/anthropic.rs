//! Anthropic messages adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use super::{build_client, join_url, map_send_error, AnalysisContext, AnalysisProvider, ProviderResponse};
use crate::config::{AnthropicConfig, StageModelConfig};
use crate::core::StageName;
use crate::errors::ProviderError;

const PROVIDER_NAME: &str = "anthropic";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

/// Calls `POST {base_url}/v1/messages`.
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    http: reqwest::Client,
    config: AnthropicConfig,
    model: StageModelConfig,
    timeout: Duration,
}

impl AnthropicProvider {
    /// Creates a provider for one stage's model settings.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Request` if the HTTP client cannot be built.
    pub fn new(
        config: AnthropicConfig,
        model: StageModelConfig,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            http: build_client(timeout)?,
            config,
            model,
            timeout,
        })
    }
}

fn first_text(blocks: Vec<ContentBlock>) -> Option<String> {
    blocks
        .into_iter()
        .find(|b| b.kind == "text")
        .and_then(|b| b.text)
}

#[async_trait]
impl AnalysisProvider for AnthropicProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn generate(
        &self,
        stage: StageName,
        ctx: &AnalysisContext,
    ) -> Result<ProviderResponse, ProviderError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Request("anthropic api key not configured".to_string()))?;

        let prompt = ctx.render_prompt();
        let body = MessagesRequest {
            model: &self.model.model,
            max_tokens: self.model.max_tokens,
            system: &ctx.system_prompt,
            messages: vec![Message {
                role: "user",
                content: &prompt,
            }],
            temperature: self.model.temperature,
        };

        debug!(stage = %stage, model = %self.model.model, "Calling messages API");
        let started = Instant::now();
        let resp = self
            .http
            .post(join_url(&self.config.base_url, "/v1/messages"))
            .header("x-api-key", api_key)
            .header("anthropic-version", &self.config.api_version)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(&e, self.timeout))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::status(status.as_u16(), &text));
        }

        let parsed: MessagesResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let content = first_text(parsed.content).ok_or(ProviderError::EmptyContent)?;

        let mut response = ProviderResponse::new(
            content,
            parsed.model.unwrap_or_else(|| self.model.model.clone()),
            PROVIDER_NAME,
        );
        if let Some(usage) = parsed.usage {
            response.input_tokens = usage.input_tokens;
            response.output_tokens = usage.output_tokens;
        }
        response.latency_ms = Some(started.elapsed().as_secs_f64() * 1000.0);
        Ok(response)
    }
}
