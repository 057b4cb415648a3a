//! Platform Configuration Module
//!
//! This module provides configuration types and protocol constants for the
//! platform block execution engine and the node that hosts it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Size of a hash (root hash, pro_tx_hash, identifiers) in bytes
pub const HASH_SIZE: usize = 32;

/// Epoch timing constants
pub const EPOCH_DURATION_MS_DEFAULT: u64 = 1_576_800_000; // 18.25 days

/// Validator set constants
pub const DEFAULT_VALIDATOR_SET_SIZE: usize = 100;
pub const DEFAULT_ROTATION_BLOCKS: u64 = 15;
pub const VALIDATOR_VOTING_POWER: u64 = 100;

/// State transition limits
pub const MAX_STATE_TRANSITION_SIZE: usize = 20_480; // 20KB

/// Fee schedule in credits
pub const BASE_TRANSITION_FEE: u64 = 1_000;
pub const FEE_PER_BYTE: u64 = 10;

/// Current platform protocol version
pub const PROTOCOL_VERSION: u32 = 1;

/// Default chain identifier
pub const DEFAULT_CHAIN_ID: &str = "platform-local";

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sled,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Memory => write!(f, "memory"),
            StorageBackend::Sled => write!(f, "sled"),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" => Ok(StorageBackend::Memory),
            "sled" | "disk" => Ok(StorageBackend::Sled),
            _ => Err(format!("Unknown storage backend: {}", s)),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Plain => write!(f, "plain"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" | "text" => Ok(LogFormat::Plain),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Complete platform configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub abci: AbciConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl PlatformConfig {
    /// Loads and validates a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: PlatformConfig = raw.parse()?;
        Ok(config)
    }

    /// Checks cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.abci.chain_id.is_empty() {
            return Err(ConfigError::Invalid("abci.chain_id must not be empty".into()));
        }
        if self.abci.validator_set_size == 0 {
            return Err(ConfigError::Invalid(
                "abci.validator_set_size must be positive".into(),
            ));
        }
        if self.abci.validator_set_rotation_blocks == 0 {
            return Err(ConfigError::Invalid(
                "abci.validator_set_rotation_blocks must be positive".into(),
            ));
        }
        if self.abci.epoch_duration_ms == 0 {
            return Err(ConfigError::Invalid(
                "abci.epoch_duration_ms must be positive".into(),
            ));
        }
        if self.storage.backend == StorageBackend::Sled && self.storage.path.is_none() {
            return Err(ConfigError::Invalid(
                "storage.path is required for the sled backend".into(),
            ));
        }
        Ok(())
    }
}

impl FromStr for PlatformConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let config: PlatformConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

/// Block execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AbciConfig {
    pub chain_id: String,
    pub initial_core_chain_locked_height: u64,
    pub validator_set_size: usize,
    pub validator_set_rotation_blocks: u64,
    pub epoch_duration_ms: u64,
    pub protocol_version: u32,
    /// JSON file with published core chain snapshots
    pub core_snapshot_path: Option<PathBuf>,
}

impl Default for AbciConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID.to_string(),
            initial_core_chain_locked_height: 1,
            validator_set_size: DEFAULT_VALIDATOR_SET_SIZE,
            validator_set_rotation_blocks: DEFAULT_ROTATION_BLOCKS,
            epoch_duration_ms: EPOCH_DURATION_MS_DEFAULT,
            protocol_version: PROTOCOL_VERSION,
            core_snapshot_path: None,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Plain,
        }
    }
}
