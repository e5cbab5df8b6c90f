//! Repository-dispatch trigger endpoint.

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use super::{DispatchAck, Dispatcher};
use crate::config::DispatchConfig;
use crate::core::TriggerEvent;
use crate::errors::DispatchError;

const USER_AGENT: &str = concat!("stagerelay/", env!("CARGO_PKG_VERSION"));

/// Posts events to `{api_base}/repos/{repository}/dispatches`.
#[derive(Clone)]
pub struct GitHubDispatcher {
    http: reqwest::Client,
    url: String,
    token: String,
}

impl std::fmt::Debug for GitHubDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubDispatcher")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl GitHubDispatcher {
    /// Creates a dispatcher from configuration.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::NotConfigured` when the repository or token is
    /// missing or the timeout is out of range, and `DispatchError::Transport`
    /// if the client cannot be built.
    pub fn new(config: &DispatchConfig) -> Result<Self, DispatchError> {
        config
            .validate()
            .map_err(|e| DispatchError::NotConfigured(e.to_string()))?;
        let repository = config
            .repository
            .as_deref()
            .filter(|r| r.contains('/'))
            .ok_or_else(|| DispatchError::NotConfigured("repository (owner/name)".to_string()))?;
        let token = config
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| DispatchError::NotConfigured("token".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            url: format!(
                "{}/repos/{}/dispatches",
                config.api_base.trim_end_matches('/'),
                repository.trim_matches('/')
            ),
            token,
        })
    }

    /// Returns the dispatch URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Dispatcher for GitHubDispatcher {
    async fn emit(&self, event: &TriggerEvent) -> Result<DispatchAck, DispatchError> {
        debug!(stage = %event.stage(), url = %self.url, "Sending repository dispatch");
        let resp = self
            .http
            .post(&self.url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .json(event)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        match resp.status() {
            StatusCode::NO_CONTENT => Ok(DispatchAck::new(Some(204))),
            status if status.is_success() => Ok(DispatchAck::new(Some(status.as_u16()))),
            status => Err(DispatchError::Rejected {
                status: status.as_u16(),
            }),
        }
    }
}
