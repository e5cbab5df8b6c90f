//! Trigger events handed to the dispatcher and status updates sent to the
//! dashboard.
//!
//! A [`TriggerEvent`] is the whole state snapshot passed from one stage to
//! the next. Parsing one back into a [`StageRequest`] is the only way a later
//! stage learns about its run, so the conversion checks the payload for
//! completeness and consistency before anything runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{PipelineStatus, StageName};
use crate::context::{validate_webhook_url, StageInput, WorkKey};
use crate::errors::{ErrorKind, ValidationError};
use crate::utils::{format_iso8601, iso_timestamp, parse_timestamp, Timestamp};

/// Default `event_type` for trigger events.
pub const DEFAULT_EVENT_TYPE: &str = "analysis-request";

/// When each earlier stage produced its output.
pub type OutputTimes = BTreeMap<StageName, Timestamp>;

/// Event that starts the next stage of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Event type understood by the trigger endpoint.
    pub event_type: String,
    /// Everything the next stage needs.
    pub client_payload: TriggerPayload,
}

/// Body of a [`TriggerEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerPayload {
    /// The run's symbol.
    pub symbol: String,
    /// The stage to run next.
    pub stage: StageName,
    /// The run id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    /// When the run started (ISO 8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_started_at: Option<String>,
    /// Output of the first stage.
    #[serde(default, alias = "gpt_result", skip_serializing_if = "Option::is_none")]
    pub stage1_output: Option<String>,
    /// Output of the second stage.
    #[serde(default, alias = "claude_result", skip_serializing_if = "Option::is_none")]
    pub stage2_output: Option<String>,
    /// When each carried output was produced (ISO 8601).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub output_timestamps: BTreeMap<StageName, String>,
    /// Destination of status updates.
    pub webhook_url: String,
    /// When the event was built (ISO 8601).
    pub timestamp: String,
}

/// A fully validated request to run one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageRequest {
    /// The run.
    pub key: WorkKey,
    /// The stage input.
    pub input: StageInput,
    /// Status webhook destination.
    pub webhook_url: String,
    /// Production times of the carried outputs.
    pub output_times: OutputTimes,
}

impl StageRequest {
    /// Creates a request, validating symbol-independent parts of the input.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the input is incomplete or the webhook
    /// destination is unusable.
    pub fn new(
        key: WorkKey,
        input: StageInput,
        webhook_url: &str,
    ) -> Result<Self, ValidationError> {
        input.validate()?;
        Ok(Self {
            key,
            input,
            webhook_url: validate_webhook_url(webhook_url)?,
            output_times: OutputTimes::new(),
        })
    }

    /// Attaches production times of earlier outputs.
    #[must_use]
    pub fn with_output_times(mut self, times: OutputTimes) -> Self {
        self.output_times = times;
        self
    }

    /// Returns the stage this request runs.
    #[must_use]
    pub const fn stage(&self) -> StageName {
        self.input.stage()
    }
}

impl TriggerEvent {
    /// Builds the event that starts `next` with the outputs produced so far.
    #[must_use]
    pub fn for_stage(
        event_type: impl Into<String>,
        key: &WorkKey,
        next: StageName,
        outputs: &[(StageName, &str)],
        output_times: &OutputTimes,
        webhook_url: &str,
    ) -> Self {
        let lookup = |stage: StageName| {
            outputs
                .iter()
                .find(|(s, _)| *s == stage)
                .map(|(_, text)| (*text).to_string())
        };

        Self {
            event_type: event_type.into(),
            client_payload: TriggerPayload {
                symbol: key.symbol().to_string(),
                stage: next,
                run_id: Some(key.run_id()),
                run_started_at: Some(format_iso8601(&key.started_at())),
                stage1_output: lookup(StageName::FastAssessment),
                stage2_output: lookup(StageName::DeepAnalysis),
                output_timestamps: output_times
                    .iter()
                    .map(|(stage, ts)| (*stage, format_iso8601(ts)))
                    .collect(),
                webhook_url: webhook_url.to_string(),
                timestamp: iso_timestamp(),
            },
        }
    }

    /// Parses an event from JSON.
    ///
    /// Accepts either the full event or a bare `client_payload` object.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the JSON does not describe a trigger.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| ValidationError::invalid("payload", e))?;

        if value.get("client_payload").is_some() {
            serde_json::from_value(value).map_err(|e| ValidationError::invalid("payload", e))
        } else {
            let client_payload: TriggerPayload = serde_json::from_value(value)
                .map_err(|e| ValidationError::invalid("payload", e))?;
            Ok(Self {
                event_type: DEFAULT_EVENT_TYPE.to_string(),
                client_payload,
            })
        }
    }

    /// Returns the stage this event starts.
    #[must_use]
    pub const fn stage(&self) -> StageName {
        self.client_payload.stage
    }

    /// Converts the event into a request for the stage it names.
    ///
    /// # Errors
    ///
    /// See [`TriggerPayload::into_request`].
    pub fn into_request(self) -> Result<StageRequest, ValidationError> {
        self.client_payload.into_request()
    }
}

impl TriggerPayload {
    /// Validates the payload and converts it into a [`StageRequest`].
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` when:
    /// - the payload names the first stage (its input is never carried by a trigger)
    /// - an output the stage depends on is missing or empty
    /// - an output from the named stage or a later one is present
    /// - the symbol, webhook destination or a timestamp is unusable
    pub fn into_request(self) -> Result<StageRequest, ValidationError> {
        let input = match self.stage {
            StageName::FastAssessment => {
                return Err(ValidationError::invalid(
                    "stage",
                    "fast-assessment is started directly, not by a trigger",
                ));
            }
            StageName::DeepAnalysis => {
                if self.stage2_output.is_some() {
                    return Err(ValidationError::invalid(
                        "stage2_output",
                        "not expected before deep-analysis has run",
                    ));
                }
                StageInput::DeepAnalysis {
                    stage1_output: self.stage1_output.unwrap_or_default(),
                }
            }
            StageName::FinalComparison => StageInput::FinalComparison {
                stage1_output: self.stage1_output.unwrap_or_default(),
                stage2_output: self.stage2_output.unwrap_or_default(),
            },
        };

        let started_at = self
            .run_started_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .map_err(|e| ValidationError::invalid("run_started_at", e))?;
        let key = WorkKey::resume(&self.symbol, self.run_id, started_at)?;

        let mut output_times = OutputTimes::new();
        for (stage, raw) in &self.output_timestamps {
            let ts = parse_timestamp(raw)
                .map_err(|e| ValidationError::invalid("output_timestamps", e))?;
            output_times.insert(*stage, ts);
        }

        Ok(StageRequest::new(key, input, &self.webhook_url)?.with_output_times(output_times))
    }
}

/// A stage-status update for the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// The run's symbol.
    pub symbol: String,
    /// Status label, e.g. `deep-analysis-completed`.
    pub stage: String,
    /// Stage output on success, error message on failure.
    pub result: String,
    /// When the update was built (ISO 8601).
    pub timestamp: String,
    /// Coarse run status.
    pub pipeline_status: PipelineStatus,
    /// The run id.
    pub run_id: Uuid,
    /// Failure classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Where the stage output was stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
}

impl StatusUpdate {
    /// Builds a success update.
    #[must_use]
    pub fn completed(
        key: &WorkKey,
        stage: StageName,
        result: impl Into<String>,
        status: PipelineStatus,
        artifact: Option<String>,
    ) -> Self {
        Self {
            symbol: key.symbol().to_string(),
            stage: stage.completed_label(),
            result: result.into(),
            timestamp: iso_timestamp(),
            pipeline_status: status,
            run_id: key.run_id(),
            error_kind: None,
            artifact,
        }
    }

    /// Builds a failure update.
    #[must_use]
    pub fn failed(key: &WorkKey, stage: StageName, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            symbol: key.symbol().to_string(),
            stage: stage.failed_label(),
            result: message.into(),
            timestamp: iso_timestamp(),
            pipeline_status: PipelineStatus::Failed,
            run_id: key.run_id(),
            error_kind: Some(kind),
            artifact: None,
        }
    }
}
