//! # Economy Configuration
//!
//! Loaded once at startup from TOML. Every field has a default, so an empty
//! file yields the production constants.
//!
//! ```toml
//! initial_tokens = 175
//! min_claim_interval_secs = 3600
//! journal_path = "data/progression.journal"
//!
//! [token]
//! name = "Ascent Token"
//! symbol = "ASC"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EconomyError, EconomyResult};
use crate::types::{Amount, INITIAL_TOKENS, MIN_CLAIM_INTERVAL};

/// Cosmetic token metadata. Owned by the ledger, never read by the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenMetadata {
    /// Human-readable token name.
    pub name: String,
    /// Ticker symbol.
    pub symbol: String,
}

impl Default for TokenMetadata {
    fn default() -> Self {
        Self {
            name: "Ascent Token".to_string(),
            symbol: "ASC".to_string(),
        }
    }
}

/// Progression engine configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    /// Tokens minted on `create_player`. TOML integers are 64-bit, so this is
    /// widened to [`Amount`] by [`EconomyConfig::initial_grant`].
    pub initial_tokens: u64,
    /// Minimum seconds between two claims.
    pub min_claim_interval_secs: u64,
    /// Commit journal location. `None` keeps the registry in memory only.
    pub journal_path: Option<PathBuf>,
    /// Token metadata handed to the reference ledger.
    pub token: TokenMetadata,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            initial_tokens: INITIAL_TOKENS,
            min_claim_interval_secs: MIN_CLAIM_INTERVAL,
            journal_path: None,
            token: TokenMetadata::default(),
        }
    }
}

impl EconomyConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> EconomyResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| EconomyError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> EconomyResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            EconomyError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    /// Tokens minted on `create_player`.
    #[inline]
    #[must_use]
    pub fn initial_grant(&self) -> Amount {
        Amount::from(self.initial_tokens)
    }

    /// Sets the journal location.
    #[must_use]
    pub fn with_journal(mut self, path: impl Into<PathBuf>) -> Self {
        self.journal_path = Some(path.into());
        self
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> EconomyResult<()> {
        if self.min_claim_interval_secs == 0 {
            return Err(EconomyError::InvalidConfig(
                "min_claim_interval_secs must be non-zero".to_string(),
            ));
        }
        if self.token.symbol.is_empty() {
            return Err(EconomyError::InvalidConfig(
                "token symbol must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = EconomyConfig::from_toml_str("").unwrap();
        assert_eq!(config, EconomyConfig::default());
        assert_eq!(config.initial_tokens, 175);
        assert_eq!(config.min_claim_interval_secs, 3600);
    }

    #[test]
    fn test_overrides() {
        let config = EconomyConfig::from_toml_str(
            r#"
            initial_tokens = 500
            min_claim_interval_secs = 60
            journal_path = "/tmp/ascent.journal"

            [token]
            symbol = "XP"
            "#,
        )
        .unwrap();

        assert_eq!(config.initial_tokens, 500);
        assert_eq!(config.min_claim_interval_secs, 60);
        assert_eq!(config.journal_path, Some(PathBuf::from("/tmp/ascent.journal")));
        assert_eq!(config.token.symbol, "XP");
        assert_eq!(config.token.name, "Ascent Token");
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = EconomyConfig::from_toml_str("min_claim_interval_secs = 0").unwrap_err();
        assert!(matches!(err, EconomyError::InvalidConfig(_)));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        assert!(EconomyConfig::from_toml_str("initial_tokens = \"lots\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("test_economy_config_{id}.toml"));
        std::fs::write(&path, "initial_tokens = 42\n").unwrap();

        let config = EconomyConfig::load(&path).unwrap();
        assert_eq!(config.initial_tokens, 42);

        std::fs::remove_file(&path).ok();
        assert!(EconomyConfig::load(&path).is_err());
    }
}
