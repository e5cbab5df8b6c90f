//! StagePorts - the adapters a stage invocation talks to.

use std::sync::Arc;

use crate::dispatch::{DisabledDispatcher, Dispatcher};
use crate::events::{NoOpStatusSink, StatusSink};
use crate::providers::AnalysisProvider;
use crate::store::ResultStore;

/// Capabilities injected into the executor.
///
/// Only the provider and store are mandatory. The dispatcher defaults to
/// [`DisabledDispatcher`] and the sink to [`NoOpStatusSink`].
#[derive(Clone)]
pub struct StagePorts {
    /// Text generation.
    pub provider: Arc<dyn AnalysisProvider>,
    /// Artifact storage.
    pub store: Arc<dyn ResultStore>,
    /// Next-stage hand-off.
    pub dispatcher: Arc<dyn Dispatcher>,
    /// Status reporting.
    pub sink: Arc<dyn StatusSink>,
}

impl std::fmt::Debug for StagePorts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagePorts")
            .field("provider", &self.provider.name())
            .finish_non_exhaustive()
    }
}

impl StagePorts {
    /// Creates ports with no dispatcher and a discarding sink.
    #[must_use]
    pub fn new(provider: Arc<dyn AnalysisProvider>, store: Arc<dyn ResultStore>) -> Self {
        Self {
            provider,
            store,
            dispatcher: Arc::new(DisabledDispatcher),
            sink: Arc::new(NoOpStatusSink),
        }
    }

    /// Sets the dispatcher.
    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Sets the status sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sink = sink;
        self
    }
}
