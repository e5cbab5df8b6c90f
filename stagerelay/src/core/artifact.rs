//! Stored artifact handles and the combined end-of-run artifact.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

use super::StageName;
use crate::context::WorkKey;
use crate::utils::{display_stamp, format_iso8601, Timestamp};

/// Which artifact of a run is being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactSlot {
    /// The output of one stage.
    Stage(StageName),
    /// The combined artifact written after the final stage.
    Combined,
}

impl ArtifactSlot {
    /// Returns the prefix used for artifact file names.
    #[must_use]
    pub const fn file_prefix(self) -> &'static str {
        match self {
            Self::Stage(stage) => stage.file_prefix(),
            Self::Combined => "complete",
        }
    }
}

impl fmt::Display for ArtifactSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage(stage) => write!(f, "{stage}"),
            Self::Combined => write!(f, "combined"),
        }
    }
}

/// Where a store put an artifact, with a digest of what was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHandle {
    /// Store-specific location (a path for the filesystem store).
    pub location: String,
    /// Hex SHA-256 of the stored content.
    pub sha256: String,
    /// Stored size in bytes.
    pub bytes: usize,
}

impl ArtifactHandle {
    /// Creates a handle for `content` stored at `location`.
    #[must_use]
    pub fn new(location: impl Into<String>, content: &str) -> Self {
        Self {
            location: location.into(),
            sha256: content_digest(content),
            bytes: content.len(),
        }
    }
}

impl fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.location)
    }
}

/// Returns the hex SHA-256 digest of `content`.
#[must_use]
pub fn content_digest(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// One stage's contribution to the combined artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedSection {
    /// The stage that produced the text.
    pub stage: StageName,
    /// When the stage produced it, if known.
    pub produced_at: Option<Timestamp>,
    /// The stage output.
    pub text: String,
}

/// All three stage outputs of one run, in stage order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedArtifact {
    /// The run's symbol.
    pub symbol: String,
    /// The run id.
    pub run_id: Uuid,
    /// When the combined artifact was assembled.
    pub generated_at: Timestamp,
    /// The stage outputs.
    pub sections: Vec<CombinedSection>,
}

impl CombinedArtifact {
    /// Assembles the artifact for a run.
    ///
    /// Sections are sorted by stage order regardless of input order.
    #[must_use]
    pub fn new(key: &WorkKey, generated_at: Timestamp, mut sections: Vec<CombinedSection>) -> Self {
        sections.sort_by_key(|s| s.stage);
        Self {
            symbol: key.symbol().to_string(),
            run_id: key.run_id(),
            generated_at,
            sections,
        }
    }

    /// Returns true when every stage contributed exactly one section.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.sections.len() == StageName::ALL.len()
            && self
                .sections
                .iter()
                .zip(StageName::ALL)
                .all(|(section, stage)| section.stage == stage)
    }

    /// Renders the artifact as plain text.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("=== STAGERELAY COMPLETE ANALYSIS ===\n");
        out.push_str(&format!("Symbol: {}\n", self.symbol));
        out.push_str(&format!("Run: {}\n", self.run_id));
        out.push_str(&format!("Generated: {}\n", display_stamp(&self.generated_at)));

        for (i, section) in self.sections.iter().enumerate() {
            out.push('\n');
            if i > 0 {
                out.push_str("---\n\n");
            }
            match section.produced_at {
                Some(ts) => out.push_str(&format!("[{}] {}\n", section.stage, format_iso8601(&ts))),
                None => out.push_str(&format!("[{}]\n", section.stage)),
            }
            out.push_str(section.text.trim_end());
            out.push('\n');
        }

        out.push_str("\n=== PIPELINE COMPLETED ===\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn section(stage: StageName, text: &str) -> CombinedSection {
        CombinedSection {
            stage,
            produced_at: None,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_handle_digest() {
        let handle = ArtifactHandle::new("results/a.txt", "abc");
        assert_eq!(
            handle.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(handle.bytes, 3);
    }

    #[test]
    fn test_slot_prefixes() {
        assert_eq!(ArtifactSlot::Stage(StageName::DeepAnalysis).file_prefix(), "deep");
        assert_eq!(ArtifactSlot::Combined.file_prefix(), "complete");
    }

    #[test]
    fn test_sections_sorted_and_complete() {
        let key = WorkKey::new("BTCUSD").unwrap();
        let artifact = CombinedArtifact::new(
            &key,
            chrono::Utc::now(),
            vec![
                section(StageName::FinalComparison, "T3"),
                section(StageName::FastAssessment, "T1"),
                section(StageName::DeepAnalysis, "T2"),
            ],
        );
        assert!(artifact.is_complete());
        assert_eq!(artifact.sections[0].text, "T1");
    }

    #[test]
    fn test_incomplete_artifact() {
        let key = WorkKey::new("BTCUSD").unwrap();
        let artifact =
            CombinedArtifact::new(&key, chrono::Utc::now(), vec![section(StageName::FastAssessment, "T1")]);
        assert!(!artifact.is_complete());
    }

    #[test]
    fn test_render_keeps_stage_order() {
        let key = WorkKey::new("BTCUSD").unwrap();
        let generated = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let artifact = CombinedArtifact::new(
            &key,
            generated,
            vec![
                section(StageName::FastAssessment, "T1"),
                section(StageName::DeepAnalysis, "T2"),
                section(StageName::FinalComparison, "T3"),
            ],
        );
        let text = artifact.render();

        let t1 = text.find("T1").unwrap();
        let t2 = text.find("T2").unwrap();
        let t3 = text.find("T3").unwrap();
        assert!(t1 < t2 && t2 < t3);
        assert!(text.contains("Symbol: BTCUSD"));
        assert!(text.contains("Generated: 02.01.2024 03:04:05 UTC"));
        assert_eq!(text.matches("---").count(), 2);
        assert!(text.ends_with("=== PIPELINE COMPLETED ===\n"));
    }
}
