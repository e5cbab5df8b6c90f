//! On-disk outbox for trigger events that could not be delivered.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

use super::{DispatchAck, Dispatcher};
use crate::core::TriggerEvent;
use crate::errors::DispatchError;
use crate::pipeline::{with_retry, RetryConfig};
use crate::utils::{file_stamp, generate_uuid, iso_timestamp, now_utc};

/// One undelivered event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Entry id.
    pub id: Uuid,
    /// When the event was first parked (ISO 8601).
    pub stored_at: String,
    /// Delivery attempts so far, including the original one.
    pub attempts: u32,
    /// The most recent delivery error.
    pub last_error: String,
    /// The event itself.
    pub event: TriggerEvent,
    #[serde(skip)]
    path: PathBuf,
}

impl OutboxEntry {
    /// Returns the file holding this entry.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Result of an `Outbox::flush`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// Entries delivered and removed.
    pub delivered: usize,
    /// Entries still pending.
    pub failed: usize,
}

/// A directory of JSON-encoded [`OutboxEntry`] files.
#[derive(Debug, Clone)]
pub struct Outbox {
    dir: PathBuf,
}

fn outbox_err(path: &Path, err: impl std::fmt::Display) -> DispatchError {
    DispatchError::Outbox(format!("{}: {err}", path.display()))
}

impl Outbox {
    /// Creates an outbox over `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the outbox directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Parks `event` after a failed delivery.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Outbox` if the entry cannot be written.
    pub async fn park(&self, event: &TriggerEvent, error: &DispatchError) -> Result<OutboxEntry, DispatchError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| outbox_err(&self.dir, e))?;

        let id = generate_uuid();
        let entry = OutboxEntry {
            id,
            stored_at: iso_timestamp(),
            attempts: 1,
            last_error: error.to_string(),
            event: event.clone(),
            path: self.dir.join(format!("{}_{}.json", file_stamp(&now_utc()), id.simple())),
        };
        self.write(&entry).await?;
        Ok(entry)
    }

    async fn write(&self, entry: &OutboxEntry) -> Result<(), DispatchError> {
        let json = serde_json::to_vec_pretty(entry).map_err(|e| outbox_err(&entry.path, e))?;
        let tmp = entry.path.with_extension("json.partial");
        fs::write(&tmp, json).await.map_err(|e| outbox_err(&tmp, e))?;
        fs::rename(&tmp, &entry.path)
            .await
            .map_err(|e| outbox_err(&entry.path, e))
    }

    /// Lists pending entries, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Outbox` if the directory or an entry cannot be read.
    pub async fn list(&self) -> Result<Vec<OutboxEntry>, DispatchError> {
        if !fs::try_exists(&self.dir).await.map_err(|e| outbox_err(&self.dir, e))? {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await.map_err(|e| outbox_err(&self.dir, e))?;
        while let Some(item) = dir.next_entry().await.map_err(|e| outbox_err(&self.dir, e))? {
            let path = item.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            let raw = fs::read_to_string(&path).await.map_err(|e| outbox_err(&path, e))?;
            let mut entry: OutboxEntry =
                serde_json::from_str(&raw).map_err(|e| outbox_err(&path, e))?;
            entry.path = path;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Re-sends every pending entry with `retry`, removing delivered ones.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Outbox` if the outbox itself cannot be read
    /// or updated. Delivery failures are counted, not returned.
    pub async fn flush(&self, dispatcher: &dyn Dispatcher, retry: &RetryConfig) -> Result<FlushReport, DispatchError> {
        let mut report = FlushReport::default();

        for mut entry in self.list().await? {
            let label = entry.id.to_string();
            let mut attempts = 0u32;
            let result = with_retry(retry, &label, DispatchError::is_retryable, || {
                attempts += 1;
                dispatcher.emit(&entry.event)
            })
            .await;

            match result {
                Ok(_) => {
                    fs::remove_file(&entry.path)
                        .await
                        .map_err(|e| outbox_err(&entry.path, e))?;
                    info!(
                        entry = %entry.id,
                        symbol = %entry.event.client_payload.symbol,
                        stage = %entry.event.stage(),
                        "Outbox entry delivered"
                    );
                    report.delivered += 1;
                }
                Err(e) => {
                    warn!(entry = %entry.id, error = %e, "Outbox entry still undeliverable");
                    entry.attempts += attempts;
                    entry.last_error = e.to_string();
                    self.write(&entry).await?;
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}

/// Wraps a dispatcher, parking failed events in an [`Outbox`].
///
/// The original error is still returned so the caller sees the failure.
#[derive(Clone)]
pub struct OutboxDispatcher {
    inner: Arc<dyn Dispatcher>,
    outbox: Outbox,
}

impl std::fmt::Debug for OutboxDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboxDispatcher")
            .field("outbox", &self.outbox)
            .finish_non_exhaustive()
    }
}

impl OutboxDispatcher {
    /// Creates a dispatcher that parks failures in `outbox`.
    #[must_use]
    pub fn new(inner: Arc<dyn Dispatcher>, outbox: Outbox) -> Self {
        Self { inner, outbox }
    }
}

#[async_trait]
impl Dispatcher for OutboxDispatcher {
    async fn emit(&self, event: &TriggerEvent) -> Result<DispatchAck, DispatchError> {
        match self.inner.emit(event).await {
            Ok(ack) => Ok(ack),
            Err(e) => {
                match self.outbox.park(event, &e).await {
                    Ok(entry) => warn!(path = %entry.path().display(), "Trigger parked in outbox"),
                    Err(park_err) => warn!(error = %park_err, "Failed to park trigger in outbox"),
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::WorkKey;
    use crate::core::{OutputTimes, StageName, DEFAULT_EVENT_TYPE};
    use crate::pipeline::JitterStrategy;
    use crate::testing::RecordingDispatcher;

    fn event() -> TriggerEvent {
        let key = WorkKey::new("BTCUSD").unwrap();
        TriggerEvent::for_stage(
            DEFAULT_EVENT_TYPE,
            &key,
            StageName::DeepAnalysis,
            &[(StageName::FastAssessment, "T1")],
            &OutputTimes::new(),
            "https://dash.example.com/hook",
        )
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(2)
            .with_base_delay_ms(1)
            .with_jitter(JitterStrategy::None)
    }

    #[tokio::test]
    async fn test_failed_emit_is_parked_and_error_returned() {
        let dir = tempfile::tempdir().unwrap();
        let inner = Arc::new(RecordingDispatcher::failing(DispatchError::Rejected { status: 502 }));
        let dispatcher = OutboxDispatcher::new(inner, Outbox::new(dir.path()));

        let err = dispatcher.emit(&event()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Rejected { status: 502 }));

        let entries = Outbox::new(dir.path()).list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event.stage(), StageName::DeepAnalysis);
        assert_eq!(entries[0].event.client_payload.stage1_output.as_deref(), Some("T1"));
        assert_eq!(entries[0].attempts, 1);
        assert!(entries[0].last_error.contains("502"));
    }

    #[tokio::test]
    async fn test_successful_emit_leaves_outbox_empty() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = OutboxDispatcher::new(
            Arc::new(RecordingDispatcher::new()),
            Outbox::new(dir.path()),
        );

        dispatcher.emit(&event()).await.unwrap();
        assert!(Outbox::new(dir.path()).list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Outbox::new(dir.path().join("never-created"));
        assert!(outbox.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_flush_delivers_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Outbox::new(dir.path());
        let sent = event();
        outbox
            .park(&sent, &DispatchError::Transport("reset".to_string()))
            .await
            .unwrap();

        let target = RecordingDispatcher::new();
        let report = outbox.flush(&target, &fast_retry()).await.unwrap();

        assert_eq!(report, FlushReport { delivered: 1, failed: 0 });
        assert_eq!(target.events(), vec![sent]);
        assert!(outbox.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_flush_keeps_undeliverable_entries() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Outbox::new(dir.path());
        outbox
            .park(&event(), &DispatchError::Transport("reset".to_string()))
            .await
            .unwrap();

        let target = RecordingDispatcher::failing(DispatchError::Rejected { status: 503 });
        let report = outbox.flush(&target, &fast_retry()).await.unwrap();

        assert_eq!(report, FlushReport { delivered: 0, failed: 1 });
        assert_eq!(target.attempts(), 2);
        let entries = outbox.list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].attempts, 3);
        assert!(entries[0].last_error.contains("503"));
    }

    #[tokio::test]
    async fn test_flush_does_not_retry_permanent_rejection() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Outbox::new(dir.path());
        outbox
            .park(&event(), &DispatchError::Transport("reset".to_string()))
            .await
            .unwrap();

        let target = RecordingDispatcher::failing(DispatchError::Rejected { status: 404 });
        outbox.flush(&target, &fast_retry().with_max_attempts(5)).await.unwrap();
        assert_eq!(target.attempts(), 1);
    }
}
