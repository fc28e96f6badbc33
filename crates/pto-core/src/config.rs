//! Store configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{PtoError, Result};

/// Default SQLite database file
pub const DEFAULT_DATABASE: &str = "pto.db";

/// Default root for derived set links
pub const DEFAULT_BASE_URL: &str = "http://localhost:8383/";

/// Observation store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PtoConfig {
    /// SQLite database path (`:memory:` for a private in-memory store)
    pub database: PathBuf,

    /// Base URL that set links are resolved against
    pub base_url: String,

    /// How long a connection waits on a locked database, in milliseconds
    pub busy_timeout_ms: u64,

    /// Observations per ingestion transaction
    pub batch_size: usize,

    /// Use write-ahead logging
    pub wal: bool,
}

impl Default for PtoConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
            base_url: DEFAULT_BASE_URL.to_string(),
            busy_timeout_ms: 5000,
            batch_size: 10_000,
            wal: true,
        }
    }
}

impl PtoConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the database path
    pub fn with_database(mut self, database: impl Into<PathBuf>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the base URL for links
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the ingestion batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the busy timeout
    pub fn with_busy_timeout_ms(mut self, busy_timeout_ms: u64) -> Self {
        self.busy_timeout_ms = busy_timeout_ms;
        self
    }

    /// Parsed base URL
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.base_url)
            .map_err(|e| PtoError::Config(format!("base_url {:?}: {}", self.base_url, e)))
    }

    /// Reject settings the store cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PtoError::Config("batch_size must be at least 1".into()));
        }
        if self.base_url()?.cannot_be_a_base() {
            return Err(PtoError::Config(format!(
                "base_url {:?} cannot be used as a link root",
                self.base_url
            )));
        }
        Ok(())
    }

    /// Parse a TOML configuration
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| PtoError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| PtoError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PtoConfig::default();
        assert_eq!(config.database, PathBuf::from(DEFAULT_DATABASE));
        assert!(config.batch_size > 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = PtoConfig::new()
            .with_database(":memory:")
            .with_base_url("https://pto.example.org/api/")
            .with_batch_size(50);

        assert_eq!(config.database, PathBuf::from(":memory:"));
        assert_eq!(config.base_url().unwrap().host_str(), Some("pto.example.org"));
        assert_eq!(config.batch_size, 50);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = PtoConfig::from_toml_str(
            r#"
            database = "/var/lib/pto/obs.db"
            batch_size = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.database, PathBuf::from("/var/lib/pto/obs.db"));
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.wal);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            PtoConfig::from_toml_str("batch_size = 0"),
            Err(PtoError::Config(_))
        ));
        assert!(matches!(
            PtoConfig::from_toml_str(r#"base_url = "not a url""#),
            Err(PtoError::Config(_))
        ));
        assert!(matches!(
            PtoConfig::from_toml_str(r#"base_url = "mailto:pto@example.org""#),
            Err(PtoError::Config(_))
        ));
    }

    #[test]
    fn test_config_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pto.toml");
        let config = PtoConfig::new().with_batch_size(7);
        config.to_file(&path).unwrap();
        assert_eq!(PtoConfig::from_file(&path).unwrap(), config);
    }
}
