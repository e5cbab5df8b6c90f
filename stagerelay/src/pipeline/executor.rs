//! Runs one stage invocation end to end.
//!
//! Order of effects within an invocation:
//!
//! 1. validate (no adapter is touched on failure)
//! 2. one provider call under a timeout
//! 3. store the output, and on the final stage the combined artifact, each
//!    write under its own timeout
//! 4. one status report
//! 5. on non-final stages, one trigger for the next stage
//!
//! Steps 2 and 3 are terminal on failure and produce a failure report.
//! Steps 4 and 5 only log a warning.

use std::time::Duration;
use tracing::{error, info, warn, Instrument};

use super::PipelineCoordinator;
use crate::config::{RelayConfig, StageSettings};
use crate::context::validate_webhook_url;
use crate::core::{
    ArtifactHandle, ArtifactSlot, PipelineState, PipelineStatus, StageName, StageOutput, StageRequest, StatusUpdate,
};
use crate::errors::{PersistenceError, ProviderError, RelayError, ValidationError};
use crate::observability::{SpanTimer, StageSpanAttributes};
use crate::stages::{build_context, CombinedOutcome, DeliveryStatus, StageOutcome, StagePorts};
use crate::utils::{now_utc, Timestamp};

/// Executes stage requests against a set of ports.
#[derive(Debug, Clone)]
pub struct StageExecutor {
    ports: StagePorts,
    models: StageSettings,
    provider_timeout: Duration,
    store_timeout: Duration,
    coordinator: PipelineCoordinator,
}

impl StageExecutor {
    /// Creates an executor with default model settings.
    #[must_use]
    pub fn new(ports: StagePorts) -> Self {
        Self {
            ports,
            models: StageSettings::default(),
            provider_timeout: Duration::from_secs(120),
            store_timeout: Duration::from_secs(30),
            coordinator: PipelineCoordinator::default(),
        }
    }

    /// Creates an executor using the stage, timeout and event settings of `config`.
    #[must_use]
    pub fn from_config(ports: StagePorts, config: &RelayConfig) -> Self {
        Self::new(ports)
            .with_models(config.stages.clone())
            .with_provider_timeout(config.provider_timeout())
            .with_store_timeout(config.store_timeout())
            .with_coordinator(PipelineCoordinator::new(config.dispatch.event_type.clone()))
    }

    /// Sets the per-stage model settings.
    #[must_use]
    pub fn with_models(mut self, models: StageSettings) -> Self {
        self.models = models;
        self
    }

    /// Sets the provider call timeout.
    #[must_use]
    pub const fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    /// Sets the timeout of each store write.
    #[must_use]
    pub const fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Sets the coordinator.
    #[must_use]
    pub fn with_coordinator(mut self, coordinator: PipelineCoordinator) -> Self {
        self.coordinator = coordinator;
        self
    }

    /// Runs one stage.
    ///
    /// # Errors
    ///
    /// - `RelayError::Validation` before any adapter call
    /// - `RelayError::Provider` or `RelayError::Persistence` after a failure
    ///   report was attempted
    ///
    /// Dispatch and report failures are recorded on the outcome instead.
    pub async fn execute(&self, request: &StageRequest) -> Result<StageOutcome, RelayError> {
        let span = StageSpanAttributes::for_run(request.stage(), &request.key).span();
        self.execute_inner(request).instrument(span).await
    }

    async fn execute_inner(&self, request: &StageRequest) -> Result<StageOutcome, RelayError> {
        let stage = request.stage();
        let state = self.validate(request)?;
        let timer = SpanTimer::start(stage.as_str());
        info!(symbol = %request.key.symbol(), run_id = %request.key.run_id(), "Stage started");

        let text = match self.generate(request).await {
            Ok(text) => text,
            Err(e) => return Err(self.fail(request, e.into()).await),
        };
        info!(chars = text.chars().count(), "Provider returned text");

        let produced_at = now_utc();
        let handle = match self
            .persist(request, ArtifactSlot::Stage(stage), produced_at, &text)
            .await
        {
            Ok(handle) => handle,
            Err(e) => return Err(self.fail(request, e.into()).await),
        };
        info!(handle = %handle, "Stage output stored");
        let output = StageOutput::new(&request.key, stage, produced_at, text, handle);

        let combined = if stage.is_terminal() {
            match self.store_combined(request, &output).await {
                Ok(combined) => Some(combined),
                Err(e) => return Err(self.fail(request, e.into()).await),
            }
        } else {
            None
        };

        let update = StatusUpdate::completed(
            &request.key,
            stage,
            output.text.clone(),
            PipelineStatus::from(state),
            Some(output.handle.location.clone()),
        );
        let report = match self.ports.sink.report(&update).await {
            Ok(()) => DeliveryStatus::Delivered,
            Err(e) => {
                warn!(error = %e, "Status report not delivered");
                DeliveryStatus::Failed(e.to_string())
            }
        };

        let trigger = self.coordinator.next_trigger(request, &output);
        let dispatch = match trigger {
            Some(ref event) => match self.ports.dispatcher.emit(event).await {
                Ok(_) => {
                    info!(next = %event.stage(), "Next stage triggered");
                    DeliveryStatus::Delivered
                }
                Err(e) => {
                    warn!(next = %event.stage(), error = %e, "Next stage trigger not delivered");
                    DeliveryStatus::Failed(e.to_string())
                }
            },
            None => DeliveryStatus::Skipped,
        };

        info!(duration_ms = timer.finish(), state = %state, "Stage completed");
        Ok(StageOutcome {
            output,
            state,
            combined,
            trigger,
            report,
            dispatch,
        })
    }

    fn validate(&self, request: &StageRequest) -> Result<PipelineState, RelayError> {
        request.input.validate()?;
        validate_webhook_url(&request.webhook_url)?;
        self.coordinator
            .advance(request)
            .map_err(|e| ValidationError::invalid("stage", e).into())
    }

    async fn generate(&self, request: &StageRequest) -> Result<String, ProviderError> {
        let stage = request.stage();
        let ctx = build_context(&request.key, &request.input, self.models.for_stage(stage));
        let call = self.ports.provider.generate(stage, &ctx);

        let response = tokio::time::timeout(self.provider_timeout, call)
            .await
            .map_err(|_| ProviderError::Timeout {
                timeout_ms: u64::try_from(self.provider_timeout.as_millis()).unwrap_or(u64::MAX),
            })??;

        tracing::debug!(attributes = ?response.to_attributes(), "Provider response");
        response.into_text()
    }

    async fn persist(
        &self,
        request: &StageRequest,
        slot: ArtifactSlot,
        produced_at: Timestamp,
        content: &str,
    ) -> Result<ArtifactHandle, PersistenceError> {
        let save = self.ports.store.save(&request.key, slot, produced_at, content);
        tokio::time::timeout(self.store_timeout, save)
            .await
            .map_err(|_| PersistenceError::Timeout {
                timeout_ms: u64::try_from(self.store_timeout.as_millis()).unwrap_or(u64::MAX),
            })?
    }

    async fn store_combined(
        &self,
        request: &StageRequest,
        output: &StageOutput,
    ) -> Result<CombinedOutcome, PersistenceError> {
        let artifact = self.coordinator.combine(request, output, now_utc());
        if !artifact.is_complete() {
            return Err(PersistenceError::Rejected(format!(
                "combined artifact has {} of {} sections",
                artifact.sections.len(),
                StageName::ALL.len()
            )));
        }
        let handle = self
            .persist(request, ArtifactSlot::Combined, artifact.generated_at, &artifact.render())
            .await?;
        info!(handle = %handle, "Combined artifact stored");
        Ok(CombinedOutcome { artifact, handle })
    }

    async fn fail(&self, request: &StageRequest, err: RelayError) -> RelayError {
        error!(kind = %err.kind(), error = %err, "Stage failed");
        let update = StatusUpdate::failed(&request.key, request.stage(), err.kind(), err.to_string());
        if let Err(e) = self.ports.sink.report(&update).await {
            warn!(error = %e, "Failure report not delivered");
        }
        err
    }
}
