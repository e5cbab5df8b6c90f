//! Stage names and the cross-invocation pipeline state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One of the three pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StageName {
    /// Quick first assessment of a market snapshot.
    #[serde(rename = "fast-assessment")]
    FastAssessment,
    /// Detailed analysis building on the first assessment.
    #[serde(rename = "deep-analysis", alias = "claude-detailed")]
    DeepAnalysis,
    /// Reconciliation of both prior outputs into one decision.
    #[serde(rename = "final-comparison")]
    FinalComparison,
}

impl StageName {
    /// All stages in execution order.
    pub const ALL: [Self; 3] = [Self::FastAssessment, Self::DeepAnalysis, Self::FinalComparison];

    /// Returns the wire name used in trigger payloads and status labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FastAssessment => "fast-assessment",
            Self::DeepAnalysis => "deep-analysis",
            Self::FinalComparison => "final-comparison",
        }
    }

    /// Returns the stage that runs after this one, if any.
    #[must_use]
    pub const fn successor(self) -> Option<Self> {
        match self {
            Self::FastAssessment => Some(Self::DeepAnalysis),
            Self::DeepAnalysis => Some(Self::FinalComparison),
            Self::FinalComparison => None,
        }
    }

    /// Returns true for the stage that ends the pipeline.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        self.successor().is_none()
    }

    /// Returns the prefix used for this stage's artifact file names.
    #[must_use]
    pub const fn file_prefix(self) -> &'static str {
        match self {
            Self::FastAssessment => "fast",
            Self::DeepAnalysis => "deep",
            Self::FinalComparison => "final",
        }
    }

    /// Returns the status label reported on success.
    #[must_use]
    pub fn completed_label(self) -> String {
        format!("{}-completed", self.as_str())
    }

    /// Returns the status label reported on failure.
    #[must_use]
    pub fn failed_label(self) -> String {
        format!("{}-failed", self.as_str())
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown stage name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown stage '{0}'")]
pub struct UnknownStage(pub String);

impl FromStr for StageName {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "fast-assessment" => Ok(Self::FastAssessment),
            "deep-analysis" | "claude-detailed" => Ok(Self::DeepAnalysis),
            "final-comparison" => Ok(Self::FinalComparison),
            other => Err(UnknownStage(other.to_string())),
        }
    }
}

/// Where a run stands, as inferred by one invocation.
///
/// No process holds this state between invocations: each stage derives
/// its starting state from the input it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum PipelineState {
    /// Nothing has completed yet.
    Pending,
    /// The fast assessment completed.
    Stage1Done,
    /// The deep analysis completed.
    Stage2Done,
    /// The final comparison completed and the combined artifact exists.
    Stage3Done,
    /// The named stage failed. Terminal.
    Failed(StageName),
}

/// Error returned for an out-of-order state transition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("stage '{stage}' cannot run from state {from:?}")]
pub struct InvalidTransition {
    /// The state the transition started from.
    pub from: PipelineState,
    /// The stage that was attempted.
    pub stage: StageName,
}

impl PipelineState {
    /// Returns the state a stage requires before it may run.
    #[must_use]
    pub const fn before(stage: StageName) -> Self {
        match stage {
            StageName::FastAssessment => Self::Pending,
            StageName::DeepAnalysis => Self::Stage1Done,
            StageName::FinalComparison => Self::Stage2Done,
        }
    }

    /// Returns the state reached once a stage succeeds.
    #[must_use]
    pub const fn after(stage: StageName) -> Self {
        match stage {
            StageName::FastAssessment => Self::Stage1Done,
            StageName::DeepAnalysis => Self::Stage2Done,
            StageName::FinalComparison => Self::Stage3Done,
        }
    }

    /// Returns the stage that should run next, if the run is still live.
    #[must_use]
    pub const fn next_stage(self) -> Option<StageName> {
        match self {
            Self::Pending => Some(StageName::FastAssessment),
            Self::Stage1Done => Some(StageName::DeepAnalysis),
            Self::Stage2Done => Some(StageName::FinalComparison),
            Self::Stage3Done | Self::Failed(_) => None,
        }
    }

    /// Returns true for `Stage3Done` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stage3Done | Self::Failed(_))
    }

    /// Records a successful stage.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless `stage` is the next stage.
    pub fn complete(self, stage: StageName) -> Result<Self, InvalidTransition> {
        if self.next_stage() == Some(stage) {
            Ok(Self::after(stage))
        } else {
            Err(InvalidTransition { from: self, stage })
        }
    }

    /// Records a failed stage.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the run already reached a terminal state.
    pub fn fail(self, stage: StageName) -> Result<Self, InvalidTransition> {
        if self.is_terminal() {
            Err(InvalidTransition { from: self, stage })
        } else {
            Ok(Self::Failed(stage))
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Stage1Done => write!(f, "stage1_done"),
            Self::Stage2Done => write!(f, "stage2_done"),
            Self::Stage3Done => write!(f, "stage3_done"),
            Self::Failed(stage) => write!(f, "failed({stage})"),
        }
    }
}

/// Coarse run status sent to the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// More stages are expected.
    InProgress,
    /// The final stage completed.
    Completed,
    /// A stage failed; no further stage will run.
    Failed,
}

impl From<PipelineState> for PipelineStatus {
    fn from(state: PipelineState) -> Self {
        match state {
            PipelineState::Pending | PipelineState::Stage1Done | PipelineState::Stage2Done => {
                Self::InProgress
            }
            PipelineState::Stage3Done => Self::Completed,
            PipelineState::Failed(_) => Self::Failed,
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
