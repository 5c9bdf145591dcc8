//! Settings groups embedded in [`PipelineConfig`](super::PipelineConfig)
//!
//! # Main Types
//!
//! - [`ModuleOverride`] - Force a block on or off at pipeline assembly time
//! - [`DebugSettings`] - Tuning capture and register dump switches
//! - [`LoggingConfig`] - Log filter and optional rolling log file

use crate::types::BlockType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Assembly-time enable override for one block
///
/// Unlike a per-request manual IQ setting, an override decides whether the
/// block is part of the pipeline at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleOverride {
    pub block: BlockType,
    pub enable: bool,
}

/// Debug capture switches applied to every request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugSettings {
    /// Copy computed LUTs into the per-frame debug record
    #[serde(default)]
    pub tuning_capture: bool,

    /// Blocks whose encoded registers are dumped after calculation
    #[serde(default)]
    pub dump_reg_config: Vec<BlockType>,
}

/// Logging configuration for the simulator binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Directory for a daily rolling log file. Console only when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// File name prefix for the rolling log file
    #[serde(default = "default_log_prefix")]
    pub file_prefix: String,
}

fn default_log_filter() -> String {
    "info,bps_iq=debug".to_string()
}

fn default_log_prefix() -> String {
    "bps-sim.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            directory: None,
            file_prefix: default_log_prefix(),
        }
    }
}
