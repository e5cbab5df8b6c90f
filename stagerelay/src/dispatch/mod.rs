//! Delivery of trigger events to the external runner.
//!
//! The executor emits at most one event per invocation and never retries.
//! [`OutboxDispatcher`] keeps undelivered events on disk so `outbox flush`
//! can re-send them later.

mod github;
mod outbox;

pub use github::GitHubDispatcher;
pub use outbox::{FlushReport, Outbox, OutboxDispatcher, OutboxEntry};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::TriggerEvent;
use crate::errors::DispatchError;

/// Acknowledgement of a delivered event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchAck {
    /// HTTP status returned by the endpoint, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// When the endpoint accepted the event (ISO 8601).
    pub accepted_at: String,
}

impl DispatchAck {
    /// Creates an acknowledgement stamped now.
    #[must_use]
    pub fn new(status: Option<u16>) -> Self {
        Self {
            status,
            accepted_at: crate::utils::iso_timestamp(),
        }
    }
}

/// Sends trigger events.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Delivers one event.
    async fn emit(&self, event: &TriggerEvent) -> Result<DispatchAck, DispatchError>;
}

/// Dispatcher for invocations that never hand off, such as the final stage.
///
/// Every emit fails with `DispatchError::NotConfigured`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledDispatcher;

#[async_trait]
impl Dispatcher for DisabledDispatcher {
    async fn emit(&self, event: &TriggerEvent) -> Result<DispatchAck, DispatchError> {
        Err(DispatchError::NotConfigured(format!(
            "no dispatcher for {} trigger",
            event.stage()
        )))
    }
}
