//! OpenAI-compatible chat completions adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use super::{build_client, join_url, map_send_error, AnalysisContext, AnalysisProvider, ProviderResponse};
use crate::config::{OpenAiConfig, StageModelConfig};
use crate::core::StageName;
use crate::errors::ProviderError;

const PROVIDER_NAME: &str = "openai";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

/// Calls `POST {base_url}/v1/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    http: reqwest::Client,
    config: OpenAiConfig,
    model: StageModelConfig,
    timeout: Duration,
}

impl OpenAiProvider {
    /// Creates a provider for one stage's model settings.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Request` if the HTTP client cannot be built.
    pub fn new(
        config: OpenAiConfig,
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

    fn endpoint(&self) -> String {
        join_url(&self.config.base_url, "/v1/chat/completions")
    }
}

#[async_trait]
impl AnalysisProvider for OpenAiProvider {
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
            .ok_or_else(|| ProviderError::Request("openai api key not configured".to_string()))?;

        let prompt = ctx.render_prompt();
        let body = ChatRequest {
            model: &self.model.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &ctx.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            max_tokens: self.model.max_tokens,
            temperature: self.model.temperature,
        };

        debug!(stage = %stage, model = %self.model.model, "Calling chat completions");
        let started = Instant::now();
        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(&e, self.timeout))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::status(status.as_u16(), &text));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(ProviderError::EmptyContent)?;

        let mut response = ProviderResponse::new(
            content,
            parsed.model.unwrap_or_else(|| self.model.model.clone()),
            PROVIDER_NAME,
        );
        if let Some(usage) = parsed.usage {
            response.input_tokens = usage.prompt_tokens;
            response.output_tokens = usage.completion_tokens;
        }
        response.latency_ms = Some(started.elapsed().as_secs_f64() * 1000.0);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;

    #[test]
    fn test_request_shape() {
        let model = RelayConfig::default().stages.fast_assessment;
        let body = ChatRequest {
            model: &model.model,
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            max_tokens: model.max_tokens,
            temperature: model.temperature,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "gpt-4");
        assert_eq!(value["max_tokens"], 600);
        assert_eq!(value["messages"][0]["role"], "user");
        assert!(value.get("temperature").is_some());
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{
            "model": "gpt-4-0613",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "T1"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("T1"));
        assert_eq!(parsed.usage.unwrap().completion_tokens, Some(3));
    }

    #[test]
    fn test_endpoint_joins_base() {
        let mut config = OpenAiConfig::default();
        config.base_url = "http://localhost:8080/".to_string();
        let provider = OpenAiProvider::new(
            config,
            RelayConfig::default().stages.final_comparison,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(provider.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_request() {
        let provider = OpenAiProvider::new(
            OpenAiConfig::default(),
            RelayConfig::default().stages.fast_assessment,
            Duration::from_secs(5),
        )
        .unwrap();
        let ctx = AnalysisContext {
            stage: StageName::FastAssessment,
            symbol: "BTCUSD".to_string(),
            fields: std::collections::BTreeMap::new(),
            instructions: String::new(),
            system_prompt: String::new(),
        };
        let err = provider.generate(StageName::FastAssessment, &ctx).await.unwrap_err();
        assert!(matches!(err, ProviderError::Request(_)));
    }
}
