//! Result of one successful stage invocation.

use serde::{Deserialize, Serialize};

use crate::core::{ArtifactHandle, CombinedArtifact, PipelineState, StageOutput, TriggerEvent};

/// What happened to a best-effort side effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// The receiver acknowledged it.
    Delivered,
    /// Sending failed; the message is the error.
    Failed(String),
    /// Not attempted for this stage.
    Skipped,
}

impl DeliveryStatus {
    /// Returns true if the receiver acknowledged it.
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    /// Returns true if sending was attempted and failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Delivered => write!(f, "delivered"),
            Self::Failed(e) => write!(f, "failed ({e})"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// The combined artifact written by the final stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedOutcome {
    /// The assembled artifact.
    pub artifact: CombinedArtifact,
    /// Where it was stored.
    pub handle: ArtifactHandle,
}

/// Everything a successful invocation produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    /// The stored stage output.
    pub output: StageOutput,
    /// The run state after this stage.
    pub state: PipelineState,
    /// The combined artifact, final stage only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined: Option<CombinedOutcome>,
    /// The trigger built for the next stage, non-terminal stages only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerEvent>,
    /// Status report delivery.
    pub report: DeliveryStatus,
    /// Trigger delivery.
    pub dispatch: DeliveryStatus,
}

impl StageOutcome {
    /// Returns true if the report or the trigger failed to send.
    #[must_use]
    pub const fn has_warnings(&self) -> bool {
        self.report.is_failed() || self.dispatch.is_failed()
    }

    /// One-line summary for the end of a CLI invocation.
    #[must_use]
    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "{} {}#{} -> {}: stored {}",
            self.output.stage,
            self.output.symbol,
            crate::utils::short_id(&self.output.run_id),
            self.state,
            self.output.handle
        );
        if let Some(ref combined) = self.combined {
            line.push_str(&format!(", combined {}", combined.handle));
        }
        line.push_str(&format!("; report {}", self.report));
        match self.trigger {
            Some(ref trigger) => line.push_str(&format!("; trigger {} {}", trigger.stage(), self.dispatch)),
            None => line.push_str("; no trigger"),
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::WorkKey;
    use crate::core::{OutputTimes, StageName, DEFAULT_EVENT_TYPE};

    fn outcome(dispatch: DeliveryStatus) -> StageOutcome {
        let key = WorkKey::new("BTCUSD").unwrap();
        let handle = ArtifactHandle::new("results/fast_BTCUSD.txt", "T1");
        StageOutcome {
            output: StageOutput::new(&key, StageName::FastAssessment, chrono::Utc::now(), "T1", handle),
            state: PipelineState::Stage1Done,
            combined: None,
            trigger: Some(TriggerEvent::for_stage(
                DEFAULT_EVENT_TYPE,
                &key,
                StageName::DeepAnalysis,
                &[(StageName::FastAssessment, "T1")],
                &OutputTimes::new(),
                "https://dash.example.com/hook",
            )),
            report: DeliveryStatus::Delivered,
            dispatch,
        }
    }

    #[test]
    fn test_summary_line() {
        let line = outcome(DeliveryStatus::Delivered).summary_line();
        assert!(line.starts_with("fast-assessment BTCUSD#"));
        assert!(line.contains("stage1_done"));
        assert!(line.contains("stored results/fast_BTCUSD.txt"));
        assert!(line.contains("trigger deep-analysis delivered"));
    }

    #[test]
    fn test_warnings() {
        assert!(!outcome(DeliveryStatus::Delivered).has_warnings());
        let failed = outcome(DeliveryStatus::Failed("HTTP 404".to_string()));
        assert!(failed.has_warnings());
        assert!(failed.summary_line().contains("failed (HTTP 404)"));
    }

    #[test]
    fn test_delivery_status_json() {
        let value = serde_json::to_value(DeliveryStatus::Failed("boom".to_string())).unwrap();
        assert_eq!(value, serde_json::json!({"status": "failed", "error": "boom"}));
        let value = serde_json::to_value(DeliveryStatus::Skipped).unwrap();
        assert_eq!(value, serde_json::json!({"status": "skipped"}));
    }
}
