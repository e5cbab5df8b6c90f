//! Stage definitions.
//!
//! The three stages differ only in what they ask the provider for and in
//! which inputs they carry. Control flow is shared and lives in
//! [`crate::pipeline::StageExecutor`].

mod ports;
mod result;

pub use ports::StagePorts;
pub use result::{CombinedOutcome, DeliveryStatus, StageOutcome};

use crate::config::StageModelConfig;
use crate::context::{StageInput, WorkKey};
use crate::core::StageName;
use crate::providers::AnalysisContext;

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a market analyst. Be concrete and concise. Do not give personal financial advice.";

/// Returns the task instructions for `stage`.
#[must_use]
pub const fn instructions(stage: StageName) -> &'static str {
    match stage {
        StageName::FastAssessment => {
            "Give a short first assessment of the instrument from the market snapshot below. \
             State the overall direction, the signals that stand out and the levels worth watching."
        }
        StageName::DeepAnalysis => {
            "Expand the first assessment below into a detailed analysis of the instrument. \
             Discuss the trend, the main risks and the likely scenarios."
        }
        StageName::FinalComparison => {
            "Compare the first assessment and the detailed analysis below. \
             Say where they agree, where they differ, and give one consolidated conclusion."
        }
    }
}

/// Builds the provider context for one stage invocation.
#[must_use]
pub fn build_context(key: &WorkKey, input: &StageInput, model: &StageModelConfig) -> AnalysisContext {
    let stage = input.stage();
    AnalysisContext {
        stage,
        symbol: key.symbol().to_string(),
        fields: input.fields(),
        instructions: instructions(stage).to_string(),
        system_prompt: model
            .system_prompt
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageSettings;
    use crate::context::MarketSnapshot;

    #[test]
    fn test_fast_assessment_context() {
        let key = WorkKey::new("BTCUSD").unwrap();
        let input = StageInput::FastAssessment {
            snapshot: MarketSnapshot::new(65000.0, 1.2, 1_000_000.0).unwrap(),
        };
        let ctx = build_context(&key, &input, &StageSettings::default().fast_assessment);

        assert_eq!(ctx.stage, StageName::FastAssessment);
        assert_eq!(ctx.symbol, "BTCUSD");
        assert_eq!(ctx.fields["price"], "65000.00");
        assert_eq!(ctx.fields["change"], "1.20");
        assert_eq!(ctx.fields["volume"], "1000000");
        assert_eq!(ctx.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_final_comparison_carries_both_outputs() {
        let key = WorkKey::new("BTCUSD").unwrap();
        let input = StageInput::FinalComparison {
            stage1_output: "T1".to_string(),
            stage2_output: "T2".to_string(),
        };
        let ctx = build_context(&key, &input, &StageSettings::default().final_comparison);

        assert_eq!(ctx.fields.len(), 2);
        assert_eq!(ctx.fields["stage1_output"], "T1");
        assert_eq!(ctx.fields["stage2_output"], "T2");
        assert_eq!(ctx.instructions, instructions(StageName::FinalComparison));
    }

    #[test]
    fn test_configured_system_prompt_wins() {
        let key = WorkKey::new("BTCUSD").unwrap();
        let mut model = StageSettings::default().deep_analysis;
        model.system_prompt = Some("Custom".to_string());
        let input = StageInput::DeepAnalysis {
            stage1_output: "T1".to_string(),
        };
        assert_eq!(build_context(&key, &input, &model).system_prompt, "Custom");
    }
}
