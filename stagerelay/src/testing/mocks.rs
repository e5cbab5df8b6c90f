//! Recording fakes for every adapter.
//!
//! Fakes optionally share a [`CallLog`] so tests can assert the order of
//! side effects across adapters.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::context::WorkKey;
use crate::core::{ArtifactHandle, ArtifactSlot, StageName, StatusUpdate, TriggerEvent};
use crate::dispatch::{DispatchAck, Dispatcher};
use crate::errors::{DispatchError, PersistenceError, ProviderError, ReportError};
use crate::events::StatusSink;
use crate::providers::{AnalysisContext, AnalysisProvider, ProviderResponse};
use crate::store::ResultStore;
use crate::utils::{file_stamp, Timestamp};

/// Ordered record of adapter calls, shared between fakes.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Returns all entries in call order.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Returns entries starting with `prefix`.
    #[must_use]
    pub fn entries_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Clears the log.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// A provider returning scripted responses.
///
/// Once the script is exhausted it answers `"<stage> analysis of <symbol>"`.
#[derive(Debug, Default)]
pub struct RecordingProvider {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    contexts: Mutex<Vec<AnalysisContext>>,
    delay: Option<Duration>,
    log: Option<CallLog>,
}

impl RecordingProvider {
    /// Creates a provider answering with `responses` in order.
    #[must_use]
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            ..Self::default()
        }
    }

    /// Creates a provider whose first call fails with `error`.
    #[must_use]
    pub fn failing(error: ProviderError) -> Self {
        Self {
            script: Mutex::new(VecDeque::from([Err(error)])),
            ..Self::default()
        }
    }

    /// Creates a provider that only echoes.
    #[must_use]
    pub fn echo() -> Self {
        Self::default()
    }

    /// Delays every answer.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Records calls into `log`.
    #[must_use]
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Returns the contexts of every call.
    #[must_use]
    pub fn contexts(&self) -> Vec<AnalysisContext> {
        self.contexts.lock().clone()
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.contexts.lock().len()
    }
}

#[async_trait]
impl AnalysisProvider for RecordingProvider {
    fn name(&self) -> &str {
        "recording"
    }

    async fn generate(
        &self,
        stage: StageName,
        ctx: &AnalysisContext,
    ) -> Result<ProviderResponse, ProviderError> {
        if let Some(ref log) = self.log {
            log.record(format!("provider:{stage}"));
        }
        self.contexts.lock().push(ctx.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().pop_front();
        let text = match next {
            Some(scripted) => scripted?,
            None => format!("{stage} analysis of {}", ctx.symbol),
        };
        Ok(ProviderResponse::new(text, "scripted", "recording"))
    }
}

/// An in-memory store that can be told to fail.
#[derive(Debug, Default)]
pub struct InMemoryResultStore {
    artifacts: Mutex<BTreeMap<String, (ArtifactSlot, String)>>,
    fail_next: AtomicUsize,
    fail_after: Mutex<Option<usize>>,
    delay: Option<Duration>,
    log: Option<CallLog>,
}

impl InMemoryResultStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records calls into `log`.
    #[must_use]
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Sleeps for `delay` inside every save.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fails the next `n` saves.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Lets `n` more saves succeed, then fails every later one.
    pub fn fail_after(&self, n: usize) {
        *self.fail_after.lock() = Some(n);
    }

    /// Returns the number of stored artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.lock().len()
    }

    /// Returns true if nothing was stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.lock().is_empty()
    }

    /// Returns the content stored at `location`.
    #[must_use]
    pub fn get(&self, location: &str) -> Option<String> {
        self.artifacts.lock().get(location).map(|(_, c)| c.clone())
    }

    /// Returns the contents stored for `slot`, in location order.
    #[must_use]
    pub fn contents_for(&self, slot: ArtifactSlot) -> Vec<String> {
        self.artifacts
            .lock()
            .values()
            .filter(|(s, _)| *s == slot)
            .map(|(_, c)| c.clone())
            .collect()
    }

    fn should_fail(&self) -> bool {
        let armed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            return true;
        }
        let mut after = self.fail_after.lock();
        match after.as_mut() {
            Some(0) => true,
            Some(n) => {
                *n -= 1;
                false
            }
            None => false,
        }
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn save(
        &self,
        key: &WorkKey,
        slot: ArtifactSlot,
        produced_at: Timestamp,
        content: &str,
    ) -> Result<ArtifactHandle, PersistenceError> {
        if let Some(ref log) = self.log {
            log.record(format!("store:{slot}"));
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.should_fail() {
            return Err(PersistenceError::io(
                format!("mem://{}", slot.file_prefix()),
                std::io::Error::other("injected store failure"),
            ));
        }

        let mut artifacts = self.artifacts.lock();
        let location = format!(
            "mem://{}_{}_{}_{}_{}",
            slot.file_prefix(),
            key.file_symbol(),
            file_stamp(&produced_at),
            key.run_tag(),
            artifacts.len()
        );
        artifacts.insert(location.clone(), (slot, content.to_string()));
        Ok(ArtifactHandle::new(location, content))
    }
}

/// A dispatcher that records events.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    events: Mutex<Vec<TriggerEvent>>,
    attempts: AtomicUsize,
    failure: Option<DispatchError>,
    log: Option<CallLog>,
}

impl RecordingDispatcher {
    /// Creates a dispatcher acknowledging every event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a dispatcher failing every emit with `error`.
    #[must_use]
    pub fn failing(error: DispatchError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    /// Records calls into `log`.
    #[must_use]
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Returns the acknowledged events.
    #[must_use]
    pub fn events(&self) -> Vec<TriggerEvent> {
        self.events.lock().clone()
    }

    /// Returns the number of emit calls, failed ones included.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn emit(&self, event: &TriggerEvent) -> Result<DispatchAck, DispatchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(ref log) = self.log {
            log.record(format!("dispatch:{}", event.stage()));
        }
        if let Some(ref error) = self.failure {
            return Err(error.clone());
        }
        self.events.lock().push(event.clone());
        Ok(DispatchAck::new(None))
    }
}

/// A status sink that records updates.
#[derive(Debug, Default)]
pub struct RecordingStatusSink {
    updates: Mutex<Vec<StatusUpdate>>,
    attempts: AtomicUsize,
    failure: Option<ReportError>,
    log: Option<CallLog>,
}

impl RecordingStatusSink {
    /// Creates a sink accepting every update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink failing every report with `error`. Updates are still recorded.
    #[must_use]
    pub fn failing(error: ReportError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    /// Records calls into `log`.
    #[must_use]
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Returns every update received.
    #[must_use]
    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates.lock().clone()
    }

    /// Returns the number of report calls.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusSink for RecordingStatusSink {
    async fn report(&self, update: &StatusUpdate) -> Result<(), ReportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(ref log) = self.log {
            log.record(format!("report:{}", update.stage));
        }
        self.updates.lock().push(update.clone());
        match self.failure {
            Some(ref error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}
