//! Tracing setup and span helpers for stage invocations.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use crate::context::WorkKey;
use crate::core::StageName;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_directive`. Logs go to stderr so
/// stdout stays free for the invocation summary. Calling this twice is a
/// no-op.
pub fn init_tracing(format: LogFormat, default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

/// Span attributes for one stage invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageSpanAttributes {
    /// Stage name.
    pub stage_name: String,
    /// Symbol of the run.
    pub symbol: Option<String>,
    /// Run id.
    pub run_id: Option<String>,
    /// Stage status.
    pub status: Option<String>,
    /// Duration in milliseconds.
    pub duration_ms: Option<f64>,
    /// Error message if failed.
    pub error: Option<String>,
}

impl StageSpanAttributes {
    /// Creates new stage span attributes.
    #[must_use]
    pub fn new(stage: StageName) -> Self {
        Self {
            stage_name: stage.to_string(),
            ..Default::default()
        }
    }

    /// Creates attributes for a stage of a known run.
    #[must_use]
    pub fn for_run(stage: StageName, key: &WorkKey) -> Self {
        Self {
            symbol: Some(key.symbol().to_string()),
            run_id: Some(key.run_id().to_string()),
            ..Self::new(stage)
        }
    }

    /// Sets the stage status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Sets the error.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Creates the tracing span for the invocation.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "stage",
            stage = %self.stage_name,
            symbol = self.symbol.as_deref().unwrap_or(""),
            run_id = self.run_id.as_deref().unwrap_or(""),
        )
    }

    /// Converts to flat key-value attributes.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();

        attrs.insert("stage.name".to_string(), self.stage_name.clone());

        if let Some(ref v) = self.symbol {
            attrs.insert("run.symbol".to_string(), v.clone());
        }
        if let Some(ref v) = self.run_id {
            attrs.insert("run.id".to_string(), v.clone());
        }
        if let Some(ref v) = self.status {
            attrs.insert("stage.status".to_string(), v.clone());
        }
        if let Some(v) = self.duration_ms {
            attrs.insert("stage.duration_ms".to_string(), v.to_string());
        }
        if let Some(ref v) = self.error {
            attrs.insert("stage.error".to_string(), v.clone());
        }

        attrs
    }
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span and returns the duration.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.elapsed_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_span_attributes() {
        let key = WorkKey::new("BTCUSD").unwrap();
        let attrs = StageSpanAttributes::for_run(StageName::DeepAnalysis, &key)
            .with_status("completed")
            .with_duration_ms(123.45);

        let flat = attrs.to_attributes();
        assert_eq!(flat.get("stage.name"), Some(&"deep-analysis".to_string()));
        assert_eq!(flat.get("run.symbol"), Some(&"BTCUSD".to_string()));
        assert_eq!(flat.get("stage.status"), Some(&"completed".to_string()));
        assert_eq!(flat.get("stage.duration_ms"), Some(&"123.45".to_string()));
    }

    #[test]
    fn test_error_attribute() {
        let flat = StageSpanAttributes::new(StageName::FastAssessment)
            .with_error("timeout")
            .to_attributes();
        assert_eq!(flat.get("stage.error"), Some(&"timeout".to_string()));
        assert!(!flat.contains_key("run.id"));
    }

    #[test]
    fn test_span_timer() {
        let timer = SpanTimer::start("test_span");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert_eq!(timer.name(), "test_span");
        let duration = timer.finish();
        assert!(duration >= 10.0);
    }

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        init_tracing(LogFormat::Text, "warn");
        init_tracing(LogFormat::Json, "warn");
    }
}
