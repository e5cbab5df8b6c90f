//! Status sink trait and the no-op sink.

use async_trait::async_trait;

use crate::core::StatusUpdate;
use crate::errors::ReportError;

/// Receives stage-status updates.
///
/// Delivery is fire-and-forget from the executor's point of view: a failed
/// report is logged and never aborts the stage.
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Sends one update.
    async fn report(&self, update: &StatusUpdate) -> Result<(), ReportError>;
}

/// A sink that discards all updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStatusSink;

#[async_trait]
impl StatusSink for NoOpStatusSink {
    async fn report(&self, _update: &StatusUpdate) -> Result<(), ReportError> {
        Ok(())
    }
}
