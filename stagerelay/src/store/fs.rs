//! Filesystem result store.
//!
//! Artifacts are written to a hidden `.partial` file owned by the writing
//! call, fsynced, then hard-linked to
//! `<prefix>_<symbol>_<stamp>_<run_tag>_<seq>.txt`. Linking fails when the
//! final name is taken, so a published artifact is never replaced and a
//! reader never sees a partially written file under a final name.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::ResultStore;
use crate::context::WorkKey;
use crate::core::{ArtifactHandle, ArtifactSlot};
use crate::errors::PersistenceError;
use crate::utils::{file_stamp, generate_uuid, next_sequence, Timestamp};

const MAX_NAME_ATTEMPTS: usize = 8;

/// Stores artifacts as text files under one directory.
#[derive(Debug, Clone)]
pub struct FsResultStore {
    root: PathBuf,
}

impl FsResultStore {
    /// Creates a store rooted at `root`. The directory is created on first save.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_name(key: &WorkKey, slot: ArtifactSlot, stamp: &str, seq: u64) -> String {
        format!(
            "{}_{}_{}_{}_{}.txt",
            slot.file_prefix(),
            key.file_symbol(),
            stamp,
            key.run_tag(),
            seq
        )
    }

    async fn write_partial(path: &Path, content: &str) -> std::io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await
    }

    /// Publishes `content` at `target`.
    ///
    /// Fails with `ErrorKind::AlreadyExists` if `target` exists, leaving it
    /// untouched. Only the partial file created here is ever removed.
    async fn write_new(&self, target: &Path, content: &str) -> Result<(), PersistenceError> {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let partial = self
            .root
            .join(format!(".{name}.{}.partial", generate_uuid().simple()));

        match Self::write_partial(&partial, content).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(PersistenceError::io(&partial, e));
            }
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                return Err(PersistenceError::io(&partial, e));
            }
        }

        let linked = fs::hard_link(&partial, target).await;
        if let Err(e) = fs::remove_file(&partial).await {
            debug!(path = %partial.display(), error = %e, "Partial file not removed");
        }
        linked.map_err(|e| PersistenceError::io(target, e))
    }
}

fn is_taken(err: &PersistenceError) -> bool {
    matches!(err, PersistenceError::Io { source, .. } if source.kind() == ErrorKind::AlreadyExists)
}

#[async_trait]
impl ResultStore for FsResultStore {
    async fn save(
        &self,
        key: &WorkKey,
        slot: ArtifactSlot,
        produced_at: Timestamp,
        content: &str,
    ) -> Result<ArtifactHandle, PersistenceError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| PersistenceError::io(&self.root, e))?;

        let stamp = file_stamp(&produced_at);
        for _ in 0..MAX_NAME_ATTEMPTS {
            let target = self
                .root
                .join(Self::file_name(key, slot, &stamp, next_sequence()));
            match self.write_new(&target, content).await {
                Ok(()) => {
                    debug!(slot = %slot, path = %target.display(), bytes = content.len(), "Artifact stored");
                    return Ok(ArtifactHandle::new(target.display().to_string(), content));
                }
                Err(e) if is_taken(&e) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(PersistenceError::Rejected(format!(
            "no free artifact name for {slot} after {MAX_NAME_ATTEMPTS} attempts"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{content_digest, StageName};
    use crate::utils::now_utc;

    fn list(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_save_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsResultStore::new(dir.path().join("results"));
        let key = WorkKey::new("BTCUSD").unwrap();

        let produced_at = now_utc();

        let handle = store
            .save(&key, ArtifactSlot::Stage(StageName::FastAssessment), produced_at, "T1")
            .await
            .unwrap();

        let names = list(store.root());
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with(&format!("fast_BTCUSD_{}_{}_", file_stamp(&produced_at), key.run_tag())));
        assert!(names[0].ends_with(".txt"));
        assert_eq!(std::fs::read_to_string(&handle.location).unwrap(), "T1");
        assert_eq!(handle.sha256, content_digest("T1"));
        assert_eq!(handle.bytes, 2);
    }

    #[tokio::test]
    async fn test_repeated_saves_never_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsResultStore::new(dir.path());
        let key = WorkKey::new("BTCUSD").unwrap();
        let slot = ArtifactSlot::Stage(StageName::FastAssessment);

        let at = now_utc();

        let first = store.save(&key, slot, at, "first").await.unwrap();
        let second = store.save(&key, slot, at, "second").await.unwrap();

        assert_ne!(first.location, second.location);
        assert_eq!(std::fs::read_to_string(&first.location).unwrap(), "first");
        assert_eq!(std::fs::read_to_string(&second.location).unwrap(), "second");
    }

    #[tokio::test]
    async fn test_no_partial_files_left() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsResultStore::new(dir.path());
        let key = WorkKey::new("ETH/USD").unwrap();

        store.save(&key, ArtifactSlot::Combined, now_utc(), "all").await.unwrap();

        let names = list(dir.path());
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("complete_ETH_USD_"));
        assert!(!names.iter().any(|n| n.ends_with(".partial")));
    }

    #[tokio::test]
    async fn test_unwritable_root_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();
        let store = FsResultStore::new(&blocker);
        let key = WorkKey::new("BTCUSD").unwrap();

        let err = store
            .save(&key, ArtifactSlot::Stage(StageName::DeepAnalysis), now_utc(), "T2")
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::Io { .. }));
    }

    #[tokio::test]
    async fn test_runs_in_same_window_get_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsResultStore::new(dir.path());
        let first = WorkKey::new("BTCUSD").unwrap();
        let second = WorkKey::new("BTCUSD").unwrap();
        let slot = ArtifactSlot::Stage(StageName::FastAssessment);
        let at = now_utc();

        let a = store.save(&first, slot, at, "first").await.unwrap();
        let b = store.save(&second, slot, at, "second").await.unwrap();

        assert_eq!(first.short_run_id(), second.short_run_id());
        assert!(a.location.contains(&first.run_tag()));
        assert!(b.location.contains(&second.run_tag()));
        assert!(!a.location.contains(&second.run_tag()));
    }

    #[tokio::test]
    async fn test_existing_artifact_is_never_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsResultStore::new(dir.path());
        let target = dir.path().join("fast_BTCUSD_taken.txt");
        std::fs::write(&target, "original").unwrap();

        let err = store.write_new(&target, "intruder").await.unwrap_err();

        assert!(is_taken(&err));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "original");
        assert_eq!(list(dir.path()), vec!["fast_BTCUSD_taken.txt"]);
    }

    #[tokio::test]
    async fn test_foreign_partial_files_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsResultStore::new(dir.path());
        let foreign = dir.path().join(".fast_BTCUSD_other.txt.partial");
        std::fs::write(&foreign, "in progress").unwrap();
        let key = WorkKey::new("BTCUSD").unwrap();

        store
            .save(&key, ArtifactSlot::Stage(StageName::FastAssessment), now_utc(), "T1")
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&foreign).unwrap(), "in progress");
        assert_eq!(list(dir.path()).len(), 2);
    }
}
