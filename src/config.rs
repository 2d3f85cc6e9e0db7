use config::{Config as ConfigLoader, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;

/// Prefix for environment overrides, e.g. `SWAP_ENGINE_UPDATE_PERIOD_MS=5000`
pub const ENV_PREFIX: &str = "SWAP_ENGINE";

/// Timing configuration for a swap engine session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Period between two quote polls (default: 10 seconds)
    pub update_period_ms: u64,
    /// Quiet period before an amount edit triggers a poll (default: 1 second)
    pub amount_debounce_ms: u64,
    /// Quiet period before a token search is applied (default: 500 ms)
    pub search_debounce_ms: u64,
    /// Delay before balances are refreshed after a sent transaction (default: 11 seconds)
    pub balance_refresh_delay_ms: u64,
    /// Upper bound for one quote source call (default: 30 seconds)
    pub quote_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            update_period_ms: 10_000,
            amount_debounce_ms: 1_000,
            search_debounce_ms: 500,
            balance_refresh_delay_ms: 11_000,
            quote_timeout_ms: 30_000,
        }
    }
}

impl EngineConfig {
    pub fn update_period(&self) -> Duration {
        Duration::from_millis(self.update_period_ms)
    }

    pub fn amount_debounce(&self) -> Duration {
        Duration::from_millis(self.amount_debounce_ms)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn balance_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.balance_refresh_delay_ms)
    }

    pub fn quote_timeout(&self) -> Duration {
        Duration::from_millis(self.quote_timeout_ms)
    }

    /// Load configuration from a TOML file, then apply `SWAP_ENGINE_*` environment overrides.
    /// Missing keys fall back to their defaults.
    pub fn load(path: &PathBuf) -> Result<Self, Error> {
        let settings = ConfigLoader::builder()
            .add_source(File::from(path.as_path()).format(FileFormat::Toml))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: EngineConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, Error> {
        let config: EngineConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &PathBuf) -> Result<(), Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("swap-express");
        path.push("engine.toml");
        path
    }

    /// Reject values that would make the engine spin or never fire
    pub fn validate(&self) -> Result<(), Error> {
        if self.update_period_ms == 0 {
            return Err(Error::Config(
                "update_period_ms must be greater than 0".to_string(),
            ));
        }
        if self.quote_timeout_ms == 0 {
            return Err(Error::Config(
                "quote_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.update_period(), Duration::from_secs(10));
        assert_eq!(config.amount_debounce(), Duration::from_secs(1));
        assert_eq!(config.search_debounce(), Duration::from_millis(500));
        assert_eq!(config.balance_refresh_delay(), Duration::from_secs(11));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = EngineConfig::from_toml_str("update_period_ms = 2500").unwrap();
        assert_eq!(config.update_period_ms, 2500);
        assert_eq!(config.amount_debounce_ms, 1_000);
    }

    #[test]
    fn test_zero_period_rejected() {
        let result = EngineConfig::from_toml_str("update_period_ms = 0");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("engine.toml");

        let config = EngineConfig {
            update_period_ms: 4_000,
            quote_timeout_ms: 8_000,
            ..EngineConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.update_period_ms, 4_000);
        assert_eq!(loaded.quote_timeout_ms, 8_000);
        assert_eq!(loaded.search_debounce_ms, 500);
    }
}
