//! Hand-off between stage invocations.
//!
//! No process outlives a stage, so the coordinator is pure: it turns a
//! finished stage into either the next stage's trigger or, after the final
//! stage, the combined artifact.

use crate::core::{
    CombinedArtifact, CombinedSection, InvalidTransition, OutputTimes, PipelineState, StageOutput,
    StageRequest, TriggerEvent, DEFAULT_EVENT_TYPE,
};
use crate::utils::Timestamp;

/// Builds triggers and combined artifacts.
#[derive(Debug, Clone)]
pub struct PipelineCoordinator {
    event_type: String,
}

impl Default for PipelineCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_TYPE)
    }
}

impl PipelineCoordinator {
    /// Creates a coordinator emitting events of `event_type`.
    #[must_use]
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
        }
    }

    /// Returns the event type of emitted triggers.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Returns the state the run reaches if `request` succeeds.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the request's inputs do not put the run
    /// directly before its stage.
    pub fn advance(&self, request: &StageRequest) -> Result<PipelineState, InvalidTransition> {
        request.input.starting_state().complete(request.stage())
    }

    /// Builds the trigger for the stage after `output`, if there is one.
    ///
    /// The trigger carries every output produced so far, verbatim.
    #[must_use]
    pub fn next_trigger(&self, request: &StageRequest, output: &StageOutput) -> Option<TriggerEvent> {
        let next = request.stage().successor()?;

        let mut outputs = request.input.prior_outputs();
        outputs.push((output.stage, output.text.as_str()));

        let mut times: OutputTimes = request.output_times.clone();
        times.insert(output.stage, output.produced_at);

        Some(TriggerEvent::for_stage(
            self.event_type.clone(),
            &request.key,
            next,
            &outputs,
            &times,
            &request.webhook_url,
        ))
    }

    /// Assembles the combined artifact from the carried outputs and `output`.
    #[must_use]
    pub fn combine(
        &self,
        request: &StageRequest,
        output: &StageOutput,
        generated_at: Timestamp,
    ) -> CombinedArtifact {
        let mut sections: Vec<CombinedSection> = request
            .input
            .prior_outputs()
            .into_iter()
            .map(|(stage, text)| CombinedSection {
                stage,
                produced_at: request.output_times.get(&stage).copied(),
                text: text.to_string(),
            })
            .collect();
        sections.push(CombinedSection {
            stage: output.stage,
            produced_at: Some(output.produced_at),
            text: output.text.clone(),
        });
        CombinedArtifact::new(&request.key, generated_at, sections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{MarketSnapshot, StageInput, WorkKey};
    use crate::core::{ArtifactHandle, StageName};
    use crate::utils::now_utc;
    use pretty_assertions::assert_eq;

    const HOOK: &str = "https://dash.example.com/hook";

    fn output(key: &WorkKey, stage: StageName, text: &str) -> StageOutput {
        StageOutput::new(key, stage, now_utc(), text, ArtifactHandle::new("mem://x", text))
    }

    #[test]
    fn test_first_stage_trigger() {
        let coordinator = PipelineCoordinator::default();
        let key = WorkKey::new("BTCUSD").unwrap();
        let request = StageRequest::new(
            key.clone(),
            StageInput::FastAssessment {
                snapshot: MarketSnapshot::new(65000.0, 1.2, 1_000_000.0).unwrap(),
            },
            HOOK,
        )
        .unwrap();

        let trigger = coordinator
            .next_trigger(&request, &output(&key, StageName::FastAssessment, "T1"))
            .unwrap();
        let payload = &trigger.client_payload;

        assert_eq!(trigger.event_type, "analysis-request");
        assert_eq!(payload.stage, StageName::DeepAnalysis);
        assert_eq!(payload.symbol, "BTCUSD");
        assert_eq!(payload.run_id, Some(key.run_id()));
        assert_eq!(payload.stage1_output.as_deref(), Some("T1"));
        assert_eq!(payload.stage2_output, None);
        assert!(payload.output_timestamps.contains_key(&StageName::FastAssessment));
        assert_eq!(coordinator.advance(&request).unwrap(), PipelineState::Stage1Done);
    }

    #[test]
    fn test_second_stage_trigger_carries_both() {
        let coordinator = PipelineCoordinator::new("custom-event");
        let key = WorkKey::new("BTCUSD").unwrap();
        let request = StageRequest::new(
            key.clone(),
            StageInput::DeepAnalysis {
                stage1_output: "T1".to_string(),
            },
            HOOK,
        )
        .unwrap();

        let trigger = coordinator
            .next_trigger(&request, &output(&key, StageName::DeepAnalysis, "T2"))
            .unwrap();

        assert_eq!(trigger.event_type, "custom-event");
        assert_eq!(trigger.stage(), StageName::FinalComparison);
        assert_eq!(trigger.client_payload.stage1_output.as_deref(), Some("T1"));
        assert_eq!(trigger.client_payload.stage2_output.as_deref(), Some("T2"));
    }

    #[test]
    fn test_final_stage_has_no_trigger_and_combines_in_order() {
        let coordinator = PipelineCoordinator::default();
        let key = WorkKey::new("BTCUSD").unwrap();
        let mut times = OutputTimes::new();
        let t1 = now_utc();
        times.insert(StageName::FastAssessment, t1);
        let request = StageRequest::new(
            key.clone(),
            StageInput::FinalComparison {
                stage1_output: "T1".to_string(),
                stage2_output: "T2".to_string(),
            },
            HOOK,
        )
        .unwrap()
        .with_output_times(times);

        let last = output(&key, StageName::FinalComparison, "T3");
        assert!(coordinator.next_trigger(&request, &last).is_none());
        assert_eq!(coordinator.advance(&request).unwrap(), PipelineState::Stage3Done);

        let combined = coordinator.combine(&request, &last, now_utc());
        assert!(combined.is_complete());
        let texts: Vec<&str> = combined.sections.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["T1", "T2", "T3"]);
        assert_eq!(combined.sections[0].produced_at, Some(t1));
        assert_eq!(combined.sections[1].produced_at, None);
        assert_eq!(combined.run_id, key.run_id());
    }
}
