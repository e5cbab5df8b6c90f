//! Work key identifying one pipeline run.

use serde::Serialize;
use uuid::Uuid;

use crate::errors::ValidationError;
use crate::utils::{generate_uuid_v7, now_utc, run_tag, short_id, Timestamp};

/// Longest symbol accepted at the process boundary.
pub const MAX_SYMBOL_LEN: usize = 64;

/// Identifies one pipeline run: a symbol plus a run id.
///
/// The run id is minted by the first stage and carried forward in every
/// trigger payload, so all artifacts of one run share it. Two runs for the
/// same symbol always get different run ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkKey {
    symbol: String,
    run_id: Uuid,
    started_at: Timestamp,
}

impl WorkKey {
    /// Starts a new run for `symbol`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the symbol is empty or unusable.
    pub fn new(symbol: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            symbol: validate_symbol(symbol)?,
            run_id: generate_uuid_v7(),
            started_at: now_utc(),
        })
    }

    /// Continues a run handed over by a previous stage.
    ///
    /// A missing run id (payloads from older producers) starts a fresh run.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the symbol is empty or unusable.
    pub fn resume(
        symbol: &str,
        run_id: Option<Uuid>,
        started_at: Option<Timestamp>,
    ) -> Result<Self, ValidationError> {
        let symbol = validate_symbol(symbol)?;
        Ok(Self {
            symbol,
            run_id: run_id.unwrap_or_else(generate_uuid_v7),
            started_at: started_at.unwrap_or_else(now_utc),
        })
    }

    /// Returns the symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Returns the run id.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns when the run started.
    #[must_use]
    pub const fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// Returns the first eight hex digits of the run id, for logs.
    #[must_use]
    pub fn short_run_id(&self) -> String {
        short_id(&self.run_id)
    }

    /// Returns the random tail of the run id, used to scope artifact names.
    #[must_use]
    pub fn run_tag(&self) -> String {
        run_tag(&self.run_id)
    }

    /// Returns the symbol restricted to characters safe in file names.
    #[must_use]
    pub fn file_symbol(&self) -> String {
        self.symbol
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl std::fmt::Display for WorkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.symbol, self.short_run_id())
    }
}

/// Checks a symbol and returns it trimmed.
///
/// # Errors
///
/// Returns `ValidationError` if the symbol is empty, too long, or contains
/// control characters.
pub fn validate_symbol(symbol: &str) -> Result<String, ValidationError> {
    let trimmed = symbol.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::missing("symbol"));
    }
    if trimmed.chars().count() > MAX_SYMBOL_LEN {
        return Err(ValidationError::invalid(
            "symbol",
            format!("longer than {MAX_SYMBOL_LEN} characters"),
        ));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(ValidationError::invalid("symbol", "contains control characters"));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_symbol() {
        let key = WorkKey::new("  BTCUSD ").unwrap();
        assert_eq!(key.symbol(), "BTCUSD");
        assert_eq!(key.run_id().get_version_num(), 7);
    }

    #[test]
    fn test_empty_symbol_rejected() {
        let err = WorkKey::new("   ").unwrap_err();
        assert_eq!(err.field.as_deref(), Some("symbol"));
    }

    #[test]
    fn test_control_characters_rejected() {
        assert!(WorkKey::new("BTC\nUSD").is_err());
    }

    #[test]
    fn test_overlong_symbol_rejected() {
        assert!(WorkKey::new(&"X".repeat(MAX_SYMBOL_LEN + 1)).is_err());
        assert!(WorkKey::new(&"X".repeat(MAX_SYMBOL_LEN)).is_ok());
    }

    #[test]
    fn test_same_symbol_distinct_runs() {
        let a = WorkKey::new("ETHUSD").unwrap();
        let b = WorkKey::new("ETHUSD").unwrap();
        assert_ne!(a.run_id(), b.run_id());
        assert_ne!(a, b);
        assert_ne!(a.run_tag(), b.run_tag());
    }

    #[test]
    fn test_resume_keeps_run_id() {
        let first = WorkKey::new("ETHUSD").unwrap();
        let resumed =
            WorkKey::resume("ETHUSD", Some(first.run_id()), Some(first.started_at())).unwrap();
        assert_eq!(first, resumed);
    }

    #[test]
    fn test_resume_without_run_id_mints_one() {
        let resumed = WorkKey::resume("ETHUSD", None, None).unwrap();
        assert_eq!(resumed.run_id().get_version_num(), 7);
    }

    #[test]
    fn test_file_symbol_sanitised() {
        let key = WorkKey::new("BTC/USD:perp").unwrap();
        assert_eq!(key.file_symbol(), "BTC_USD_perp");
    }
}
