//! Durable storage for stage artifacts.

mod fs;

pub use fs::FsResultStore;

use async_trait::async_trait;

use crate::context::WorkKey;
use crate::core::{ArtifactHandle, ArtifactSlot};
use crate::errors::PersistenceError;
use crate::utils::Timestamp;

/// Writes stage artifacts.
///
/// A successful `save` means the content is durable and will never be
/// overwritten by a later save, even one with an identical key, slot and
/// timestamp.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persists `content` for `slot` of the run identified by `key`.
    ///
    /// `produced_at` is the time recorded on the artifact and the one the
    /// store keys it under.
    async fn save(
        &self,
        key: &WorkKey,
        slot: ArtifactSlot,
        produced_at: Timestamp,
        content: &str,
    ) -> Result<ArtifactHandle, PersistenceError>;
}
