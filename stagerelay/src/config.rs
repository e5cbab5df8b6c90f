//! Configuration for adapters and stages.
//!
//! Every adapter receives its settings through these types at construction
//! time. Nothing below the CLI reads environment variables; the CLI layers
//! flag and environment values over a TOML file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::core::{StageName, DEFAULT_EVENT_TYPE};
use crate::errors::ValidationError;
use crate::pipeline::RetryConfig;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        /// The config path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`RelayConfig`].
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Directory receiving stage artifacts.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    /// Directory receiving undelivered trigger events.
    #[serde(default)]
    pub outbox_dir: Option<PathBuf>,
    /// Upper bound on one provider call, in seconds.
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_seconds: f64,
    /// Upper bound on one artifact write, in seconds.
    #[serde(default = "default_store_timeout")]
    pub store_timeout_seconds: f64,
    /// OpenAI-compatible provider settings.
    #[serde(default)]
    pub openai: OpenAiConfig,
    /// Anthropic provider settings.
    #[serde(default)]
    pub anthropic: AnthropicConfig,
    /// Per-stage model settings.
    #[serde(default)]
    pub stages: StageSettings,
    /// Trigger endpoint settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Status webhook settings.
    #[serde(default)]
    pub status: StatusConfig,
    /// Redelivery policy for the outbox.
    #[serde(default)]
    pub outbox_retry: RetryConfig,
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_provider_timeout() -> f64 {
    120.0
}

fn default_store_timeout() -> f64 {
    30.0
}

/// Longest timeout accepted for any adapter call, in seconds.
pub const MAX_TIMEOUT_SECONDS: f64 = 3600.0;

/// Converts a configured number of seconds into a timeout.
///
/// # Errors
///
/// Returns `ValidationError` naming `field` unless `seconds` is positive,
/// finite and at most [`MAX_TIMEOUT_SECONDS`].
pub fn checked_timeout(field: &str, seconds: f64) -> Result<Duration, ValidationError> {
    if !(seconds > 0.0 && seconds <= MAX_TIMEOUT_SECONDS) {
        return Err(ValidationError::invalid(
            field,
            format!("must be a number of seconds above 0 and at most {MAX_TIMEOUT_SECONDS}"),
        ));
    }
    Duration::try_from_secs_f64(seconds).map_err(|e| ValidationError::invalid(field, e))
}

fn timeout_or(seconds: f64, fallback: f64) -> Duration {
    checked_timeout("timeout", seconds)
        .or_else(|_| checked_timeout("timeout", fallback))
        .unwrap_or(Duration::from_secs(1))
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            outbox_dir: None,
            provider_timeout_seconds: default_provider_timeout(),
            store_timeout_seconds: default_store_timeout(),
            openai: OpenAiConfig::default(),
            anthropic: AnthropicConfig::default(),
            stages: StageSettings::default(),
            dispatch: DispatchConfig::default(),
            status: StatusConfig::default(),
            outbox_retry: RetryConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` on malformed input.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Loads a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Sets the results directory.
    #[must_use]
    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = dir.into();
        self
    }

    /// Sets the outbox directory.
    #[must_use]
    pub fn with_outbox_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.outbox_dir = Some(dir.into());
        self
    }

    /// Gets the provider timeout as a Duration.
    ///
    /// An out-of-range value, which [`Self::validate_for`] rejects, falls
    /// back to the default.
    #[must_use]
    pub fn provider_timeout(&self) -> Duration {
        timeout_or(self.provider_timeout_seconds, default_provider_timeout())
    }

    /// Gets the store write timeout as a Duration.
    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        timeout_or(self.store_timeout_seconds, default_store_timeout())
    }

    /// Checks that everything `stage` needs is configured.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` naming the missing setting.
    pub fn validate_for(&self, stage: StageName) -> Result<(), ValidationError> {
        checked_timeout("provider_timeout_seconds", self.provider_timeout_seconds)?;
        checked_timeout("store_timeout_seconds", self.store_timeout_seconds)?;
        self.status.validate()?;

        let model = self.stages.for_stage(stage);
        if model.model.trim().is_empty() {
            return Err(ValidationError::missing(format!("stages.{stage}.model")));
        }
        match model.provider {
            ProviderKind::OpenAi if !has_value(self.openai.api_key.as_deref()) => {
                return Err(ValidationError::missing("openai.api_key"));
            }
            ProviderKind::Anthropic if !has_value(self.anthropic.api_key.as_deref()) => {
                return Err(ValidationError::missing("anthropic.api_key"));
            }
            _ => {}
        }

        if !stage.is_terminal() {
            self.dispatch.validate()?;
            if !has_value(self.dispatch.repository.as_deref()) {
                return Err(ValidationError::missing("dispatch.repository"));
            }
            if !has_value(self.dispatch.token.as_deref()) {
                return Err(ValidationError::missing("dispatch.token"));
            }
        }
        Ok(())
    }
}

fn has_value(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

/// Which text-generation API a stage calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions.
    #[serde(rename = "openai")]
    OpenAi,
    /// Anthropic messages.
    #[serde(rename = "anthropic")]
    Anthropic,
}

/// OpenAI-compatible provider settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// API key.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Base URL without the `/v1/...` path.
    #[serde(default = "default_openai_base")]
    pub base_url: String,
}

fn default_openai_base() -> String {
    "https://api.openai.com".to_string()
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_openai_base(),
        }
    }
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("has_api_key", &self.api_key.is_some())
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Anthropic provider settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    /// API key.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Base URL without the `/v1/...` path.
    #[serde(default = "default_anthropic_base")]
    pub base_url: String,
    /// Value of the `anthropic-version` header.
    #[serde(default = "default_anthropic_version")]
    pub api_version: String,
}

fn default_anthropic_base() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_anthropic_version() -> String {
    "2023-06-01".to_string()
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_anthropic_base(),
            api_version: default_anthropic_version(),
        }
    }
}

impl std::fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("has_api_key", &self.api_key.is_some())
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .finish()
    }
}

/// Model settings for one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageModelConfig {
    /// The API to call.
    pub provider: ProviderKind,
    /// Model identifier.
    pub model: String,
    /// Completion token limit.
    pub max_tokens: u32,
    /// Sampling temperature, provider default when absent.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// System instruction, stage default when absent.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

/// Model settings for every stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StageSettings {
    /// First stage.
    #[serde(default = "default_fast_assessment")]
    pub fast_assessment: StageModelConfig,
    /// Second stage.
    #[serde(default = "default_deep_analysis")]
    pub deep_analysis: StageModelConfig,
    /// Final stage.
    #[serde(default = "default_final_comparison")]
    pub final_comparison: StageModelConfig,
}

fn default_fast_assessment() -> StageModelConfig {
    StageModelConfig {
        provider: ProviderKind::OpenAi,
        model: "gpt-4".to_string(),
        max_tokens: 600,
        temperature: Some(0.7),
        system_prompt: None,
    }
}

fn default_deep_analysis() -> StageModelConfig {
    StageModelConfig {
        provider: ProviderKind::Anthropic,
        model: "claude-3-sonnet-20240229".to_string(),
        max_tokens: 1500,
        temperature: None,
        system_prompt: None,
    }
}

fn default_final_comparison() -> StageModelConfig {
    StageModelConfig {
        provider: ProviderKind::OpenAi,
        model: "gpt-4".to_string(),
        max_tokens: 1200,
        temperature: Some(0.8),
        system_prompt: None,
    }
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            fast_assessment: default_fast_assessment(),
            deep_analysis: default_deep_analysis(),
            final_comparison: default_final_comparison(),
        }
    }
}

impl StageSettings {
    /// Returns the settings of one stage.
    #[must_use]
    pub const fn for_stage(&self, stage: StageName) -> &StageModelConfig {
        match stage {
            StageName::FastAssessment => &self.fast_assessment,
            StageName::DeepAnalysis => &self.deep_analysis,
            StageName::FinalComparison => &self.final_comparison,
        }
    }
}

/// Trigger endpoint settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// API base URL.
    #[serde(default = "default_dispatch_base")]
    pub api_base: String,
    /// Target repository as `owner/name`.
    #[serde(default)]
    pub repository: Option<String>,
    /// Access token.
    #[serde(default)]
    pub token: Option<String>,
    /// `event_type` of emitted triggers.
    #[serde(default = "default_event_type")]
    pub event_type: String,
    /// Request timeout in seconds.
    #[serde(default = "default_dispatch_timeout")]
    pub timeout_seconds: f64,
}

fn default_dispatch_base() -> String {
    "https://api.github.com".to_string()
}

fn default_event_type() -> String {
    DEFAULT_EVENT_TYPE.to_string()
}

fn default_dispatch_timeout() -> f64 {
    10.0
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            api_base: default_dispatch_base(),
            repository: None,
            token: None,
            event_type: default_event_type(),
            timeout_seconds: default_dispatch_timeout(),
        }
    }
}

impl std::fmt::Debug for DispatchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchConfig")
            .field("api_base", &self.api_base)
            .field("repository", &self.repository)
            .field("has_token", &self.token.is_some())
            .field("event_type", &self.event_type)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl DispatchConfig {
    /// Gets timeout as Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        timeout_or(self.timeout_seconds, default_dispatch_timeout())
    }

    /// Checks the request timeout.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for an out-of-range `timeout_seconds`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        checked_timeout("dispatch.timeout_seconds", self.timeout_seconds).map(|_| ())
    }
}

/// Status webhook settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_status_timeout")]
    pub timeout_seconds: f64,
    /// Request timeout for the final stage's report.
    #[serde(default = "default_final_status_timeout")]
    pub final_timeout_seconds: f64,
}

fn default_status_timeout() -> f64 {
    10.0
}

fn default_final_status_timeout() -> f64 {
    15.0
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_status_timeout(),
            final_timeout_seconds: default_final_status_timeout(),
        }
    }
}

impl StatusConfig {
    /// Gets the report timeout for `stage`.
    #[must_use]
    pub fn timeout_for(&self, stage: StageName) -> Duration {
        if stage.is_terminal() {
            timeout_or(self.final_timeout_seconds, default_final_status_timeout())
        } else {
            timeout_or(self.timeout_seconds, default_status_timeout())
        }
    }

    /// Checks both report timeouts.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for the first out-of-range timeout.
    pub fn validate(&self) -> Result<(), ValidationError> {
        checked_timeout("status.timeout_seconds", self.timeout_seconds)?;
        checked_timeout("status.final_timeout_seconds", self.final_timeout_seconds)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn complete_config() -> RelayConfig {
        let mut config = RelayConfig::new();
        config.openai.api_key = Some("sk-test".to_string());
        config.anthropic.api_key = Some("ak-test".to_string());
        config.dispatch.repository = Some("acme/pipeline".to_string());
        config.dispatch.token = Some("ghp_test".to_string());
        config
    }

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.results_dir, PathBuf::from("results"));
        assert_eq!(config.dispatch.event_type, "analysis-request");
        assert_eq!(config.stages.deep_analysis.provider, ProviderKind::Anthropic);
        assert_eq!(config.stages.fast_assessment.max_tokens, 600);
        assert_eq!(config.status.timeout_for(StageName::FinalComparison), Duration::from_secs(15));
        assert_eq!(config.status.timeout_for(StageName::FastAssessment), Duration::from_secs(10));
    }

    #[test]
    fn test_from_toml_partial() {
        let config = RelayConfig::from_toml_str(
            r#"
            results_dir = "/var/lib/stagerelay"
            outbox_dir = "/var/lib/stagerelay/outbox"

            [openai]
            base_url = "http://localhost:8080"

            [stages.deep-analysis]
            provider = "openai"
            model = "gpt-4o"
            max_tokens = 900

            [dispatch]
            repository = "acme/pipeline"
            "#,
        )
        .unwrap();

        assert_eq!(config.results_dir, PathBuf::from("/var/lib/stagerelay"));
        assert!(config.outbox_dir.is_some());
        assert_eq!(config.openai.base_url, "http://localhost:8080");
        assert_eq!(config.stages.deep_analysis.provider, ProviderKind::OpenAi);
        assert_eq!(config.stages.deep_analysis.model, "gpt-4o");
        assert_eq!(config.stages.fast_assessment.model, "gpt-4");
        assert_eq!(config.dispatch.api_base, "https://api.github.com");
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            RelayConfig::from_toml_str("results_dir = ["),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = RelayConfig::load(Path::new("/nonexistent/stagerelay.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_validate_for_complete_config() {
        let config = complete_config();
        for stage in StageName::ALL {
            assert!(config.validate_for(stage).is_ok());
        }
    }

    #[test]
    fn test_validate_for_missing_provider_key() {
        let mut config = complete_config();
        config.anthropic.api_key = None;

        assert!(config.validate_for(StageName::FastAssessment).is_ok());
        let err = config.validate_for(StageName::DeepAnalysis).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("anthropic.api_key"));
    }

    #[test]
    fn test_final_stage_needs_no_dispatcher() {
        let mut config = complete_config();
        config.dispatch.token = None;

        assert!(config.validate_for(StageName::FinalComparison).is_ok());
        let err = config.validate_for(StageName::FastAssessment).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("dispatch.token"));
    }

    #[test]
    fn test_out_of_range_timeouts_are_validation_errors() {
        let cases = [
            ("[status]\ntimeout_seconds = inf", "status.timeout_seconds"),
            ("[status]\nfinal_timeout_seconds = nan", "status.final_timeout_seconds"),
            ("[dispatch]\ntimeout_seconds = 1e300", "dispatch.timeout_seconds"),
            ("provider_timeout_seconds = -inf", "provider_timeout_seconds"),
            ("store_timeout_seconds = 0.0", "store_timeout_seconds"),
        ];
        for (toml, field) in cases {
            let mut config = RelayConfig::from_toml_str(toml).unwrap();
            config.openai.api_key = Some("sk-test".to_string());
            config.anthropic.api_key = Some("ak-test".to_string());
            config.dispatch.repository = Some("acme/pipeline".to_string());
            config.dispatch.token = Some("ghp_test".to_string());

            let err = config.validate_for(StageName::FastAssessment).unwrap_err();
            assert_eq!(err.field.as_deref(), Some(field), "{toml}");
        }
    }

    #[test]
    fn test_out_of_range_timeouts_never_panic() {
        let mut config = RelayConfig::new();
        config.provider_timeout_seconds = f64::INFINITY;
        config.store_timeout_seconds = f64::NAN;
        config.dispatch.timeout_seconds = 1e300;
        config.status.timeout_seconds = f64::INFINITY;

        assert_eq!(config.provider_timeout(), Duration::from_secs(120));
        assert_eq!(config.store_timeout(), Duration::from_secs(30));
        assert_eq!(config.dispatch.timeout(), Duration::from_secs(10));
        assert_eq!(config.status.timeout_for(StageName::FastAssessment), Duration::from_secs(10));
    }

    #[test]
    fn test_checked_timeout_bounds() {
        assert_eq!(checked_timeout("t", 0.25).unwrap(), Duration::from_millis(250));
        assert_eq!(checked_timeout("t", MAX_TIMEOUT_SECONDS).unwrap(), Duration::from_secs(3600));
        assert!(checked_timeout("t", MAX_TIMEOUT_SECONDS + 1.0).is_err());
        assert!(checked_timeout("t", f64::INFINITY).is_err());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let rendered = format!("{:?}", complete_config());
        assert!(!rendered.contains("sk-test"));
        assert!(!rendered.contains("ghp_test"));
    }
}
