//! Configuration management for Vreg.
//!
//! This module provides configuration loading, saving, and defaults.
//! Configuration is stored in TOML format in a platform-appropriate location.

use crate::error::{Result, VregError};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Main configuration structure for Vreg.
///
/// ## Example Configuration File (vreg.toml)
///
/// ```toml
/// [general]
/// log_level = "info"
/// data_file = "/srv/vreg/records.json"
///
/// [sync]
/// refresh_interval_secs = 30
/// freshness_window_secs = 10
/// auto_refresh = true
/// fetch_timeout_secs = 15
///
/// [search]
/// debounce_ms = 300
/// max_results = 100
/// fuzzy_enrichment = false
/// max_pattern_bytes = 1048576
///
/// [cache]
/// capacity = 1000
/// max_age_secs = 86400
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Mirror refresh behaviour
    pub sync: SyncConfig,

    /// Query handling
    pub search: SearchConfig,

    /// Result cache bounds
    pub cache: CacheConfig,
}

/// General configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// JSON record file used by the CLI (None = default location)
    pub data_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            data_file: None,
            log_level: "info".to_string(),
        }
    }
}

/// Mirror refresh configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Period of the background refresh timer
    pub refresh_interval_secs: u64,

    /// A non-forced refresh within this window of the last one is skipped
    pub freshness_window_secs: u64,

    /// Start the background refresh timer on `start()`
    pub auto_refresh: bool,

    /// Upper bound on a single full fetch (0 = no limit)
    pub fetch_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            refresh_interval_secs: 30,
            freshness_window_secs: 10,
            auto_refresh: true,
            fetch_timeout_secs: 15,
        }
    }
}

impl SyncConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.freshness_window_secs)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        (self.fetch_timeout_secs > 0).then(|| Duration::from_secs(self.fetch_timeout_secs))
    }
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Quiet period after the last keystroke before a search runs
    pub debounce_ms: u64,

    /// Maximum number of ranked results kept per query
    pub max_results: usize,

    /// Run the subsequence scan on every query, not only when the index misses
    pub fuzzy_enrichment: bool,

    /// Mirror size above which the subsequence scan runs in parallel
    pub parallel_threshold: usize,

    /// Compiled size limit for a subsequence pattern; longer queries fail
    pub max_pattern_bytes: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            debounce_ms: 300,
            max_results: 100,
            fuzzy_enrichment: false,
            parallel_threshold: 10000,
            max_pattern_bytes: 1 << 20,
        }
    }
}

impl SearchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached queries
    pub capacity: usize,

    /// Lifetime of a cached query
    pub max_age_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            capacity: 1000,
            max_age_secs: 24 * 60 * 60,
        }
    }
}

impl CacheConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default config if no config file exists.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Config::default());
        }

        info!(path = %path.display(), "Loading configuration");
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents).map_err(|e| VregError::ConfigError {
            reason: format!("Failed to parse config: {}", e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path()?;
        self.save_to(&config_path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        info!(path = %path.display(), "Saving configuration");
        let contents = toml::to_string_pretty(self).map_err(|e| VregError::ConfigError {
            reason: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, contents)?;
        Ok(())
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.cache.capacity == 0 {
            return Err(VregError::ConfigError {
                reason: "cache.capacity must be at least 1".to_string(),
            });
        }
        if self.search.max_results == 0 {
            return Err(VregError::ConfigError {
                reason: "search.max_results must be at least 1".to_string(),
            });
        }
        if self.sync.auto_refresh && self.sync.refresh_interval_secs == 0 {
            return Err(VregError::ConfigError {
                reason: "sync.refresh_interval_secs must be positive when auto_refresh is on"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "vreg").ok_or_else(|| VregError::ConfigError {
            reason: "Could not determine config directory".to_string(),
        })?;

        Ok(dirs.config_dir().join("vreg.toml"))
    }

    /// Get the default data directory path.
    pub fn default_data_dir() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "vreg").ok_or_else(|| VregError::ConfigError {
            reason: "Could not determine data directory".to_string(),
        })?;

        Ok(dirs.data_dir().to_path_buf())
    }

    /// Get the record file (from config or default).
    pub fn data_file(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.general.data_file {
            Ok(path.clone())
        } else {
            Ok(Self::default_data_dir()?.join("records.json"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sync.refresh_interval(), Duration::from_secs(30));
        assert_eq!(config.sync.freshness_window(), Duration::from_secs(10));
        assert_eq!(config.search.debounce(), Duration::from_millis(300));
        assert_eq!(config.search.max_results, 100);
        assert_eq!(config.cache.capacity, 1000);
        assert_eq!(config.cache.max_age(), Duration::from_secs(86400));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let mut config = Config::default();
        config.search.max_results = 25;
        config.general.data_file = Some(PathBuf::from("/tmp/records.json"));

        config.save_to(&config_path).unwrap();
        let loaded = Config::load_from(&config_path).unwrap();

        assert_eq!(loaded.search.max_results, 25);
        assert_eq!(loaded.data_file().unwrap(), PathBuf::from("/tmp/records.json"));
    }

    #[test]
    fn test_load_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.search.max_results, 100); // Default value
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("partial.toml");
        fs::write(&config_path, "[search]\ndebounce_ms = 120\n").unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.search.debounce_ms, 120);
        assert_eq!(config.search.max_results, 100);
        assert_eq!(config.sync.refresh_interval_secs, 30);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("bad.toml");
        fs::write(&config_path, "[cache]\ncapacity = 0\n").unwrap();

        let err = Config::load_from(&config_path).unwrap_err();
        assert!(matches!(err, VregError::ConfigError { .. }));
    }

    #[test]
    fn test_fetch_timeout_zero_disables() {
        let mut config = Config::default();
        assert_eq!(config.sync.fetch_timeout(), Some(Duration::from_secs(15)));
        config.sync.fetch_timeout_secs = 0;
        assert_eq!(config.sync.fetch_timeout(), None);
    }
}
