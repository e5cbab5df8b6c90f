//! Core domain model types for stagerelay.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Stage names and the pipeline state machine
//! - Stage outputs, artifact handles and the combined artifact
//! - Trigger events and status updates

mod artifact;
mod event;
mod output;
mod status;

pub use artifact::{content_digest, ArtifactHandle, ArtifactSlot, CombinedArtifact, CombinedSection};
pub use event::{
    OutputTimes, StageRequest, StatusUpdate, TriggerEvent, TriggerPayload, DEFAULT_EVENT_TYPE,
};
pub use output::StageOutput;
pub use status::{InvalidTransition, PipelineState, PipelineStatus, StageName, UnknownStage};
