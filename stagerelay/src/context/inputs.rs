//! Per-stage inputs with exhaustive completeness checks.
//!
//! A stage's input is everything it is allowed to know about the run. For
//! the later stages that is exactly what the previous stage's trigger
//! payload carried, so validating the input here is what guarantees that
//! no stage runs without the outputs it depends on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::{PipelineState, StageName};
use crate::errors::ValidationError;

/// The market data the first stage assesses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Last traded price.
    pub price: f64,
    /// Percent change over the reference window.
    pub change_pct: f64,
    /// Traded volume.
    pub volume: f64,
}

impl MarketSnapshot {
    /// Creates a validated snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if a value is not finite, the price is not
    /// positive, or the volume is negative.
    pub fn new(price: f64, change_pct: f64, volume: f64) -> Result<Self, ValidationError> {
        let snapshot = Self {
            price,
            change_pct,
            volume,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// See [`MarketSnapshot::new`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.price.is_finite() {
            return Err(ValidationError::invalid("price", "not a finite number"));
        }
        if self.price <= 0.0 {
            return Err(ValidationError::invalid("price", "must be positive"));
        }
        if !self.change_pct.is_finite() {
            return Err(ValidationError::invalid("change", "not a finite number"));
        }
        if !self.volume.is_finite() {
            return Err(ValidationError::invalid("volume", "not a finite number"));
        }
        if self.volume < 0.0 {
            return Err(ValidationError::invalid("volume", "must not be negative"));
        }
        Ok(())
    }
}

/// Everything one stage needs, one variant per stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "kebab-case")]
pub enum StageInput {
    /// Input of the first stage.
    FastAssessment {
        /// The snapshot to assess.
        snapshot: MarketSnapshot,
    },
    /// Input of the second stage.
    DeepAnalysis {
        /// Output text of the first stage.
        stage1_output: String,
    },
    /// Input of the final stage.
    FinalComparison {
        /// Output text of the first stage.
        stage1_output: String,
        /// Output text of the second stage.
        stage2_output: String,
    },
}

impl StageInput {
    /// Returns the stage this input belongs to.
    #[must_use]
    pub const fn stage(&self) -> StageName {
        match self {
            Self::FastAssessment { .. } => StageName::FastAssessment,
            Self::DeepAnalysis { .. } => StageName::DeepAnalysis,
            Self::FinalComparison { .. } => StageName::FinalComparison,
        }
    }

    /// Returns the run state implied by the presence of prior outputs.
    #[must_use]
    pub const fn starting_state(&self) -> PipelineState {
        PipelineState::before(self.stage())
    }

    /// Checks that every field the stage requires is present and usable.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` naming the first offending field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::FastAssessment { snapshot } => snapshot.validate(),
            Self::DeepAnalysis { stage1_output } => require_text("stage1_output", stage1_output),
            Self::FinalComparison {
                stage1_output,
                stage2_output,
            } => {
                require_text("stage1_output", stage1_output)?;
                require_text("stage2_output", stage2_output)
            }
        }
    }

    /// Returns the outputs of earlier stages carried by this input, in order.
    #[must_use]
    pub fn prior_outputs(&self) -> Vec<(StageName, &str)> {
        match self {
            Self::FastAssessment { .. } => Vec::new(),
            Self::DeepAnalysis { stage1_output } => {
                vec![(StageName::FastAssessment, stage1_output.as_str())]
            }
            Self::FinalComparison {
                stage1_output,
                stage2_output,
            } => vec![
                (StageName::FastAssessment, stage1_output.as_str()),
                (StageName::DeepAnalysis, stage2_output.as_str()),
            ],
        }
    }

    /// Flattens the input into the key-value form handed to providers.
    #[must_use]
    pub fn fields(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        match self {
            Self::FastAssessment { snapshot } => {
                fields.insert("price".to_string(), format!("{:.2}", snapshot.price));
                fields.insert("change".to_string(), format!("{:.2}", snapshot.change_pct));
                fields.insert("volume".to_string(), format!("{:.0}", snapshot.volume));
            }
            Self::DeepAnalysis { stage1_output } => {
                fields.insert("stage1_output".to_string(), stage1_output.clone());
            }
            Self::FinalComparison {
                stage1_output,
                stage2_output,
            } => {
                fields.insert("stage1_output".to_string(), stage1_output.clone());
                fields.insert("stage2_output".to_string(), stage2_output.clone());
            }
        }
        fields
    }
}

/// Checks the status webhook destination and returns it trimmed.
///
/// # Errors
///
/// Returns `ValidationError` unless the value is an absolute http(s) URL.
pub fn validate_webhook_url(url: &str) -> Result<String, ValidationError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::missing("webhook_url"));
    }
    let parsed = reqwest::Url::parse(trimmed)
        .map_err(|e| ValidationError::invalid("webhook_url", e))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ValidationError::invalid("webhook_url", "must be an http(s) URL"));
    }
    Ok(trimmed.to_string())
}

fn require_text(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::missing(field))
    } else {
        Ok(())
    }
}
