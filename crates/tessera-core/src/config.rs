//! Tessera configuration.
//!
//! Provides configuration file support via `tessera.toml`, environment
//! variables and runtime overrides.
//!
//! # Priority (highest to lowest)
//!
//! 1. Runtime overrides (API, CLI flags)
//! 2. Environment variables (`TESSERA_*`, sections separated by `__`)
//! 3. Configuration file (`tessera.toml`)
//! 4. Default values
//!
//! Parameters that shape the persisted graph (`dimension`, `metric`, `m`,
//! `m0`, `max_level`) are frozen in `index.json` when an index is created and
//! take precedence over this file when the index is reopened.

use crate::distance::DistanceMetric;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to parse configuration.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Configuration key that failed validation.
        key: String,
        /// Validation error message.
        message: String,
    },
}

impl From<ConfigError> for crate::error::Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Neighbor selection strategy used by insert and compaction repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Keep the `M` closest candidates.
    Simple,
    /// Diversity heuristic (HNSW algorithm 4 with an alpha factor).
    #[default]
    Heuristic,
}

/// HNSW graph configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswConfig {
    /// Maximum degree on levels above 0 (M parameter).
    pub m: usize,
    /// Maximum degree on level 0. `None` = `2 * m`.
    pub m0: Option<usize>,
    /// Beam width while inserting.
    pub ef_construction: usize,
    /// Cap on the randomly drawn node level.
    pub max_level: u8,
    /// Seed for the level generator. `None` = derived from the clock.
    pub seed: Option<u64>,
    /// Neighbor selection strategy.
    pub selection: SelectionStrategy,
    /// Add the candidates' own neighbors to the selection pool.
    pub extend_candidates: bool,
    /// Back-fill with pruned candidates when the heuristic leaves slots empty.
    pub keep_pruned: bool,
    /// Diversity factor; 1.0 is the classic heuristic.
    pub alpha: f32,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 16,
            m0: None,
            ef_construction: 200,
            max_level: 16,
            seed: None,
            selection: SelectionStrategy::Heuristic,
            extend_candidates: false,
            keep_pruned: true,
            alpha: 1.0,
        }
    }
}

impl HnswConfig {
    /// Effective level-0 degree cap.
    #[must_use]
    pub fn effective_m0(&self) -> usize {
        self.m0.unwrap_or(self.m * 2)
    }
}

/// Search configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Default beam width when a request does not set one.
    pub ef_search: usize,
    /// Largest `k` a single request may ask for.
    pub max_k: usize,
    /// Candidate expansions between two deadline checks.
    pub cancel_check_interval: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            ef_search: 64,
            max_k: 10_000,
            cancel_check_interval: 64,
        }
    }
}

/// Write-ahead log configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalConfig {
    /// `fdatasync` every record before acknowledging it.
    pub fsync: bool,
    /// Segment size that triggers a roll-over.
    pub segment_max_bytes: u64,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            fsync: true,
            segment_max_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Snapshot configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Seconds between timed snapshots (0 = timer disabled).
    pub interval_secs: u64,
    /// WAL bytes written since the last snapshot that trigger a new one.
    pub wal_bytes_threshold: u64,
    /// Number of snapshot files kept on disk.
    pub retain: usize,
    /// Take a final snapshot on `close()`.
    pub on_close: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            wal_bytes_threshold: 32 * 1024 * 1024,
            retain: 2,
            on_close: true,
        }
    }
}

/// Compaction configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Run the background compaction worker.
    pub enabled: bool,
    /// Queued tombstones that trigger a cycle.
    pub tombstone_threshold: usize,
    /// Seconds between timed cycles (0 = timer disabled).
    pub interval_secs: u64,
    /// Maximum nodes unlinked per critical section.
    pub batch_size: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tombstone_threshold: 1_000,
            interval_secs: 60,
            batch_size: 512,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace.
    pub level: String,
    /// Log format: text or json.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Main Tessera configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TesseraConfig {
    /// HNSW graph configuration.
    pub hnsw: HnswConfig,
    /// Search configuration.
    pub search: SearchConfig,
    /// WAL configuration.
    pub wal: WalConfig,
    /// Snapshot configuration.
    pub snapshot: SnapshotConfig,
    /// Compaction configuration.
    pub compaction: CompactionConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl TesseraConfig {
    /// Loads configuration from `tessera.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("tessera.toml")
    }

    /// Loads configuration from a specific file path, then environment.
    ///
    /// A missing file is not an error; defaults apply.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("TESSERA_").split("__"))
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Creates a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml_str))
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Serializes the configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        if !(2..=128).contains(&self.hnsw.m) {
            return Err(invalid(
                "hnsw.m",
                format!("value {} is out of range [2, 128]", self.hnsw.m),
            ));
        }
        let m0 = self.hnsw.effective_m0();
        if m0 < self.hnsw.m || m0 > 512 {
            return Err(invalid(
                "hnsw.m0",
                format!("value {m0} must be in [m, 512]"),
            ));
        }
        if !(1..=4096).contains(&self.hnsw.ef_construction) {
            return Err(invalid(
                "hnsw.ef_construction",
                format!(
                    "value {} is out of range [1, 4096]",
                    self.hnsw.ef_construction
                ),
            ));
        }
        if self.hnsw.max_level == 0 || self.hnsw.max_level > 32 {
            return Err(invalid(
                "hnsw.max_level",
                format!("value {} is out of range [1, 32]", self.hnsw.max_level),
            ));
        }
        if !(1.0..=2.0).contains(&self.hnsw.alpha) {
            return Err(invalid(
                "hnsw.alpha",
                format!("value {} is out of range [1.0, 2.0]", self.hnsw.alpha),
            ));
        }
        if self.search.ef_search == 0 {
            return Err(invalid("search.ef_search", "must be > 0".to_string()));
        }
        if self.search.max_k == 0 {
            return Err(invalid("search.max_k", "must be > 0".to_string()));
        }
        if self.search.cancel_check_interval == 0 {
            return Err(invalid(
                "search.cancel_check_interval",
                "must be > 0".to_string(),
            ));
        }
        if self.wal.segment_max_bytes < 4096 {
            return Err(invalid(
                "wal.segment_max_bytes",
                format!("value {} must be >= 4096", self.wal.segment_max_bytes),
            ));
        }
        if self.snapshot.retain == 0 {
            return Err(invalid("snapshot.retain", "must be >= 1".to_string()));
        }
        if self.compaction.batch_size == 0 {
            return Err(invalid("compaction.batch_size", "must be > 0".to_string()));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(invalid(
                "logging.level",
                format!(
                    "value '{}' is invalid, expected one of: {:?}",
                    self.logging.level, valid_levels
                ),
            ));
        }
        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(invalid(
                "logging.format",
                format!(
                    "value '{}' is invalid, expected one of: {:?}",
                    self.logging.format, valid_formats
                ),
            ));
        }

        Ok(())
    }

    /// Checks the settings that depend on the index's metric.
    ///
    /// The alpha relaxation assumes non-negative distances. Dot-product
    /// distances are negated inner products, so only the classic rule
    /// (`alpha = 1.0`) is accepted for them.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for `hnsw.alpha` when the
    /// combination is unsupported.
    pub fn validate_for_metric(&self, metric: DistanceMetric) -> Result<(), ConfigError> {
        let relaxed = self.hnsw.selection == SelectionStrategy::Heuristic
            && (self.hnsw.alpha - 1.0).abs() > f32::EPSILON;
        if metric == DistanceMetric::DotProduct && relaxed {
            return Err(ConfigError::InvalidValue {
                key: "hnsw.alpha".to_string(),
                message: format!(
                    "value {} is not supported with the dot metric, use 1.0",
                    self.hnsw.alpha
                ),
            });
        }
        Ok(())
    }
}
