//! The persisted output of one stage.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ArtifactHandle, StageName};
use crate::context::WorkKey;
use crate::utils::Timestamp;

/// Text produced by a stage, attributed to its run and stage.
///
/// Only constructed after the text was durably stored, so holding a
/// `StageOutput` means the artifact behind `handle` exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutput {
    /// The producing stage.
    pub stage: StageName,
    /// The run's symbol.
    pub symbol: String,
    /// The run id.
    pub run_id: Uuid,
    /// When the text was produced.
    pub produced_at: Timestamp,
    /// The generated text.
    pub text: String,
    /// Where the text was stored.
    pub handle: ArtifactHandle,
}

impl StageOutput {
    /// Creates an output for a stored artifact.
    #[must_use]
    pub fn new(
        key: &WorkKey,
        stage: StageName,
        produced_at: Timestamp,
        text: impl Into<String>,
        handle: ArtifactHandle,
    ) -> Self {
        Self {
            stage,
            symbol: key.symbol().to_string(),
            run_id: key.run_id(),
            produced_at,
            text: text.into(),
            handle,
        }
    }

    /// Returns the length of the text in characters.
    #[must_use]
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}
