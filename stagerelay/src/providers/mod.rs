//! Text-generation providers.
//!
//! A stage calls its [`AnalysisProvider`] exactly once. Adapters receive
//! their credentials and model settings at construction and map every
//! failure onto [`ProviderError`].

mod anthropic;
mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ProviderKind, RelayConfig};
use crate::core::StageName;
use crate::errors::ProviderError;

/// Everything a provider needs to produce one stage's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisContext {
    /// The stage being run.
    pub stage: StageName,
    /// The run's symbol.
    pub symbol: String,
    /// Named inputs of the stage.
    pub fields: BTreeMap<String, String>,
    /// Task instructions for the model.
    pub instructions: String,
    /// System instruction.
    pub system_prompt: String,
}

impl AnalysisContext {
    /// Renders the user message sent to the model.
    #[must_use]
    pub fn render_prompt(&self) -> String {
        let mut prompt = String::with_capacity(self.instructions.len() + 64);
        prompt.push_str(&self.instructions);
        prompt.push_str("\n\nSymbol: ");
        prompt.push_str(&self.symbol);
        for (name, value) in &self.fields {
            prompt.push('\n');
            if value.contains('\n') {
                prompt.push_str(&format!("\n[{name}]\n{value}\n"));
            } else {
                prompt.push_str(&format!("{name}: {value}"));
            }
        }
        prompt
    }
}

/// Text returned by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Generated text.
    pub content: String,
    /// Model that produced it.
    pub model: String,
    /// Provider name.
    pub provider: String,
    /// Prompt tokens, when the provider reports usage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u32>,
    /// Completion tokens, when the provider reports usage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u32>,
    /// Round-trip time of the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
}

impl ProviderResponse {
    /// Creates a response with just content and origin.
    #[must_use]
    pub fn new(content: impl Into<String>, model: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            provider: provider.into(),
            input_tokens: None,
            output_tokens: None,
            latency_ms: None,
        }
    }

    /// Returns total tokens.
    #[must_use]
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens
            .unwrap_or(0)
            .saturating_add(self.output_tokens.unwrap_or(0))
    }

    /// Converts to flat log attributes.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("llm.model".to_string(), serde_json::json!(self.model));
        map.insert("llm.provider".to_string(), serde_json::json!(self.provider));
        if let Some(t) = self.input_tokens {
            map.insert("llm.input_tokens".to_string(), serde_json::json!(t));
        }
        if let Some(t) = self.output_tokens {
            map.insert("llm.output_tokens".to_string(), serde_json::json!(t));
        }
        map.insert("llm.total_tokens".to_string(), serde_json::json!(self.total_tokens()));
        if let Some(l) = self.latency_ms {
            map.insert("llm.latency_ms".to_string(), serde_json::json!(l));
        }
        map
    }

    /// Returns the trimmed content, rejecting whitespace-only text.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::EmptyContent` if nothing usable remains.
    pub fn into_text(self) -> Result<String, ProviderError> {
        let trimmed = self.content.trim();
        if trimmed.is_empty() {
            return Err(ProviderError::EmptyContent);
        }
        Ok(trimmed.to_string())
    }
}

/// A text-generation capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Returns the provider name used in logs.
    fn name(&self) -> &str;

    /// Generates the text for one stage.
    async fn generate(
        &self,
        stage: StageName,
        ctx: &AnalysisContext,
    ) -> Result<ProviderResponse, ProviderError>;
}

/// Builds the provider configured for `stage`.
///
/// # Errors
///
/// Returns `ProviderError::Request` if the HTTP client cannot be built.
pub fn provider_for_stage(
    config: &RelayConfig,
    stage: StageName,
) -> Result<Arc<dyn AnalysisProvider>, ProviderError> {
    let model = config.stages.for_stage(stage).clone();
    let timeout = config.provider_timeout();
    Ok(match model.provider {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(config.openai.clone(), model, timeout)?),
        ProviderKind::Anthropic => {
            Arc::new(AnthropicProvider::new(config.anthropic.clone(), model, timeout)?)
        }
    })
}

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Request(e.to_string()))
}

pub(crate) fn map_send_error(err: &reqwest::Error, timeout: Duration) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    } else {
        ProviderError::Request(err.to_string())
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
