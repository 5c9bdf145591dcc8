//! Configuration module for bps-iq
//!
//! This module handles the pipeline configuration: which chip revision the
//! pipeline is assembled for, how deep the in-flight request queue is (this
//! sizes every LUT buffer pool), which blocks are overridden at assembly time
//! and which diagnostics run per frame.
//!
//! # Config Location
//!
//! The simulator looks for `config.toml` in the platform config directory:
//! - **Linux**: `~/.config/bps-iq/`
//! - **macOS**: `~/Library/Application Support/bps-iq/`
//! - **Windows**: `%APPDATA%\bps-iq\`
//!
//! # Formats
//!
//! Files ending in `.json` are read and written as JSON, everything else as
//! TOML.
//!
//! # Example
//!
//! ```ignore
//! use bps_iq::config::PipelineConfig;
//!
//! let config = PipelineConfig::load("bps.toml")?;
//! config.validate()?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{BpsError, Result, ResultExt};
use crate::types::{ChipRevision, SensorFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "bps-iq";

/// Default config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Largest supported in-flight request queue depth
pub const MAX_REQUEST_QUEUE_DEPTH: usize = 32;

/// Get the default config file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID).join(CONFIG_FILE))
}

/// Serialization format, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Raw chip revision id as reported by the kernel driver
    #[serde(default = "default_revision")]
    pub revision: u32,

    /// Maximum number of requests with outstanding hardware work
    #[serde(default = "default_queue_depth")]
    pub request_queue_depth: usize,

    /// Sensor color format, used to filter blocks at assembly
    #[serde(default)]
    pub sensor_format: SensorFormat,

    /// Per-frame diagnostics
    #[serde(default)]
    pub debug: DebugSettings,

    /// Execute the blocks of one frame on worker threads
    #[serde(default)]
    pub parallel_blocks: bool,

    /// Assembly-time block overrides
    #[serde(default)]
    pub module_overrides: Vec<ModuleOverride>,

    /// Statistics plugins to resolve from the plugin registry
    #[serde(default)]
    pub stats_plugins: Vec<String>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_revision() -> u32 {
    ChipRevision::Titan480.raw()
}

fn default_queue_depth() -> usize {
    4
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            revision: default_revision(),
            request_queue_depth: default_queue_depth(),
            sensor_format: SensorFormat::default(),
            debug: DebugSettings::default(),
            parallel_blocks: false,
            module_overrides: Vec::new(),
            stats_plugins: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a config file, TOML or JSON by extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BpsError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        match ConfigFormat::for_path(path) {
            ConfigFormat::Json => serde_json::from_str(&content).map_err(|e| {
                BpsError::Config(format!("Failed to parse {}: {}", path.display(), e))
            }),
            ConfigFormat::Toml => toml::from_str(&content).map_err(|e| {
                BpsError::Config(format!("Failed to parse {}: {}", path.display(), e))
            }),
        }
    }

    /// Load from the default location, falling back to defaults
    pub fn load_or_default() -> Self {
        let Some(path) = default_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config, TOML or JSON by extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(BpsError::from)
                    .with_context(|| {
                        format!("Failed to create config directory {}", parent.display())
                    })?;
            }
        }

        let content = match ConfigFormat::for_path(path) {
            ConfigFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|e| BpsError::Serialization(e.to_string()))?,
            ConfigFormat::Toml => {
                toml::to_string_pretty(self).map_err(|e| BpsError::Serialization(e.to_string()))?
            }
        };

        std::fs::write(path, content)
            .map_err(BpsError::from)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Check value ranges and cross-field consistency
    pub fn validate(&self) -> Result<()> {
        if ChipRevision::from_raw(self.revision).is_none() {
            return Err(BpsError::UnsupportedRevision { raw: self.revision });
        }
        if self.request_queue_depth == 0 || self.request_queue_depth > MAX_REQUEST_QUEUE_DEPTH {
            return Err(BpsError::Config(format!(
                "request_queue_depth must be in 1..={}, got {}",
                MAX_REQUEST_QUEUE_DEPTH, self.request_queue_depth
            )));
        }

        let mut seen = HashSet::new();
        for ov in &self.module_overrides {
            if !seen.insert(ov.block) {
                return Err(BpsError::Config(format!(
                    "duplicate module override for {}",
                    ov.block
                )));
            }
        }
        Ok(())
    }

    /// The parsed chip revision
    pub fn chip_revision(&self) -> Result<ChipRevision> {
        ChipRevision::from_raw(self.revision)
            .ok_or(BpsError::UnsupportedRevision { raw: self.revision })
    }
}
