//! Dashboard webhook sink.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::StatusSink;
use crate::core::StatusUpdate;
use crate::errors::ReportError;

/// Posts each update as JSON to a fixed URL. Any 2xx status is accepted.
#[derive(Debug, Clone)]
pub struct WebhookStatusSink {
    http: reqwest::Client,
    url: String,
}

impl WebhookStatusSink {
    /// Creates a sink posting to `url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Transport` if the client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ReportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReportError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    /// Returns the destination URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl StatusSink for WebhookStatusSink {
    async fn report(&self, update: &StatusUpdate) -> Result<(), ReportError> {
        debug!(url = %self.url, status = %update.stage, "Posting status update");
        let resp = self
            .http
            .post(&self.url)
            .json(update)
            .send()
            .await
            .map_err(|e| ReportError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ReportError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::WorkKey;
    use crate::core::{PipelineStatus, StageName};

    #[test]
    fn test_url_kept() {
        let sink = WebhookStatusSink::new("https://dash.example.com/hook", Duration::from_secs(10)).unwrap();
        assert_eq!(sink.url(), "https://dash.example.com/hook");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let sink = WebhookStatusSink::new("http://127.0.0.1:9/hook", Duration::from_millis(500)).unwrap();
        let key = WorkKey::new("BTCUSD").unwrap();
        let update = StatusUpdate::completed(&key, StageName::FastAssessment, "T1", PipelineStatus::InProgress, None);

        let err = sink.report(&update).await.unwrap_err();
        assert!(matches!(err, ReportError::Transport(_)));
    }
}
