//! Test fixtures for stage runs.

use std::sync::Arc;

use super::mocks::{
    CallLog, InMemoryResultStore, RecordingDispatcher, RecordingProvider, RecordingStatusSink,
};
use crate::context::{MarketSnapshot, StageInput, WorkKey};
use crate::core::StageRequest;
use crate::pipeline::StageExecutor;
use crate::stages::StagePorts;

/// Webhook URL used by fixtures.
pub const TEST_WEBHOOK: &str = "https://dash.example.com/hook";

/// Recording fakes for every port, sharing one call log.
pub struct TestHarness {
    /// Shared call log.
    pub log: CallLog,
    /// Provider fake.
    pub provider: Arc<RecordingProvider>,
    /// Store fake.
    pub store: Arc<InMemoryResultStore>,
    /// Dispatcher fake.
    pub dispatcher: Arc<RecordingDispatcher>,
    /// Status sink fake.
    pub sink: Arc<RecordingStatusSink>,
}

impl TestHarness {
    /// Wires `provider` with fresh store, dispatcher and sink fakes.
    #[must_use]
    pub fn new(provider: RecordingProvider) -> Self {
        Self::with_parts(provider, RecordingDispatcher::new(), RecordingStatusSink::new())
    }

    /// Wires the given fakes with a fresh store.
    #[must_use]
    pub fn with_parts(
        provider: RecordingProvider,
        dispatcher: RecordingDispatcher,
        sink: RecordingStatusSink,
    ) -> Self {
        let log = CallLog::new();
        Self {
            provider: Arc::new(provider.with_log(log.clone())),
            store: Arc::new(InMemoryResultStore::new().with_log(log.clone())),
            dispatcher: Arc::new(dispatcher.with_log(log.clone())),
            sink: Arc::new(sink.with_log(log.clone())),
            log,
        }
    }

    /// Returns ports backed by the fakes.
    #[must_use]
    pub fn ports(&self) -> StagePorts {
        StagePorts::new(self.provider.clone(), self.store.clone())
            .with_dispatcher(self.dispatcher.clone())
            .with_sink(self.sink.clone())
    }

    /// Returns an executor over [`Self::ports`].
    #[must_use]
    pub fn executor(&self) -> StageExecutor {
        StageExecutor::new(self.ports())
    }
}

impl std::fmt::Debug for TestHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestHarness")
            .field("calls", &self.log.entries())
            .finish_non_exhaustive()
    }
}

/// The snapshot used across tests: price 65000, change 1.2%, volume 1M.
#[must_use]
pub fn sample_snapshot() -> MarketSnapshot {
    MarketSnapshot {
        price: 65000.0,
        change_pct: 1.2,
        volume: 1_000_000.0,
    }
}

/// A first-stage request for `symbol` with a fresh run id.
///
/// # Panics
///
/// Panics if `symbol` is blank.
#[must_use]
pub fn fast_request(symbol: &str) -> StageRequest {
    StageRequest {
        key: WorkKey::new(symbol).expect("fixture symbol"),
        input: StageInput::FastAssessment {
            snapshot: sample_snapshot(),
        },
        webhook_url: TEST_WEBHOOK.to_string(),
        output_times: Default::default(),
    }
}

/// A final-stage request for `symbol` carrying `t1` and `t2`.
///
/// # Panics
///
/// Panics if `symbol` is blank.
#[must_use]
pub fn final_request(symbol: &str, t1: &str, t2: &str) -> StageRequest {
    StageRequest {
        key: WorkKey::new(symbol).expect("fixture symbol"),
        input: StageInput::FinalComparison {
            stage1_output: t1.to_string(),
            stage2_output: t2.to_string(),
        },
        webhook_url: TEST_WEBHOOK.to_string(),
        output_times: Default::default(),
    }
}
