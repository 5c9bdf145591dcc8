//! Core data types for bps-iq
//!
//! This module contains the fundamental data structures shared by the module
//! registry, the per-block execution protocol and the frame executor.
//!
//! # Main Types
//!
//! - [`ChipRevision`] - Closed set of supported ISP hardware revisions
//! - [`BlockType`] - The BPS IQ blocks, listed in pipeline order
//! - [`TriggerSnapshot`] - Per-frame scalar capture context (gain, lux, CCT, ...)
//! - [`FrameControls`] - Frame-level capture controls that can force blocks off
//! - [`LutBank`] - Double-buffer bank selector for LUT payloads
//!
//! # Revisions
//!
//! Revisions are identified on the wire by a raw 32-bit id. Only the ids listed
//! in [`ChipRevision::from_raw`] are accepted; anything else is an unsupported
//! configuration and pipeline assembly refuses to continue.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A supported ISP hardware revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChipRevision {
    /// Titan 150
    Titan150,
    /// Titan 160
    Titan160,
    /// Titan 170
    Titan170,
    /// Titan 175
    Titan175,
    /// Titan 480
    Titan480,
}

/// Hardware families that share module tables and LUT layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RevisionFamily {
    /// Titan 150/160/170/175
    Titan17x,
    /// Titan 480
    Titan480,
}

impl ChipRevision {
    /// Raw revision id as reported by the camera kernel driver
    pub const fn raw(self) -> u32 {
        match self {
            ChipRevision::Titan150 => 0x0001_0500,
            ChipRevision::Titan160 => 0x0001_0600,
            ChipRevision::Titan170 => 0x0001_0700,
            ChipRevision::Titan175 => 0x0001_0705,
            ChipRevision::Titan480 => 0x0004_0800,
        }
    }

    /// Parse a raw revision id. Returns `None` for unknown hardware.
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::all().iter().copied().find(|rev| rev.raw() == raw)
    }

    /// Get all supported revisions
    pub fn all() -> &'static [ChipRevision] {
        &[
            ChipRevision::Titan150,
            ChipRevision::Titan160,
            ChipRevision::Titan170,
            ChipRevision::Titan175,
            ChipRevision::Titan480,
        ]
    }

    /// The hardware family this revision belongs to
    pub fn family(self) -> RevisionFamily {
        match self {
            ChipRevision::Titan150
            | ChipRevision::Titan160
            | ChipRevision::Titan170
            | ChipRevision::Titan175 => RevisionFamily::Titan17x,
            ChipRevision::Titan480 => RevisionFamily::Titan480,
        }
    }
}

impl fmt::Display for ChipRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChipRevision::Titan150 => write!(f, "Titan150"),
            ChipRevision::Titan160 => write!(f, "Titan160"),
            ChipRevision::Titan170 => write!(f, "Titan170"),
            ChipRevision::Titan175 => write!(f, "Titan175"),
            ChipRevision::Titan480 => write!(f, "Titan480"),
        }
    }
}

impl fmt::Display for RevisionFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevisionFamily::Titan17x => write!(f, "Titan17x"),
            RevisionFamily::Titan480 => write!(f, "Titan480"),
        }
    }
}

/// A BPS IQ hardware block
///
/// Variants are declared in hardware pipeline order; `Ord` follows that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlockType {
    /// Pedestal correction
    PedestalCorrection,
    /// Linearization / black level
    Linearization,
    /// Bad pixel and phase-detection pixel correction
    #[serde(alias = "BPCPDPC")]
    BpcPdpc,
    /// Bayer demultiplexer
    Demux,
    /// HDR reconstruction and motion artifact correction
    Hdr,
    /// Adaptive Bayer filter (denoise)
    Abf,
    /// Lens shading correction
    Lsc,
    /// Gb/Gr imbalance correction
    Gic,
    /// Demosaic
    Demosaic,
    /// Color correction
    ColorCorrection,
    /// Global tone mapping
    Gtm,
    /// Gamma
    Gamma,
    /// Color space transform
    Cst,
    /// Chroma sub-sampling
    ChromaSubSample,
    /// Hybrid noise reduction
    Hnr,
    /// White balance gains
    WhiteBalance,
    /// AWB Bayer-grid statistics
    AwbBgStats,
    /// HDR Bayer histogram statistics
    HdrBHistStats,
}

impl BlockType {
    /// Get all block types in pipeline order
    pub fn all() -> &'static [BlockType] {
        &[
            BlockType::PedestalCorrection,
            BlockType::Linearization,
            BlockType::BpcPdpc,
            BlockType::Demux,
            BlockType::Hdr,
            BlockType::Abf,
            BlockType::Lsc,
            BlockType::Gic,
            BlockType::Demosaic,
            BlockType::ColorCorrection,
            BlockType::Gtm,
            BlockType::Gamma,
            BlockType::Cst,
            BlockType::ChromaSubSample,
            BlockType::Hnr,
            BlockType::WhiteBalance,
            BlockType::AwbBgStats,
            BlockType::HdrBHistStats,
        ]
    }

    /// Short hardware name, used in logs and tag section names
    pub fn name(&self) -> &'static str {
        match self {
            BlockType::PedestalCorrection => "Pedestal",
            BlockType::Linearization => "Linearization",
            BlockType::BpcPdpc => "BPCPDPC",
            BlockType::Demux => "Demux",
            BlockType::Hdr => "HDR",
            BlockType::Abf => "ABF",
            BlockType::Lsc => "LSC",
            BlockType::Gic => "GIC",
            BlockType::Demosaic => "Demosaic",
            BlockType::ColorCorrection => "CC",
            BlockType::Gtm => "GTM",
            BlockType::Gamma => "Gamma",
            BlockType::Cst => "CST",
            BlockType::ChromaSubSample => "ChromaSubSample",
            BlockType::Hnr => "HNR",
            BlockType::WhiteBalance => "WB",
            BlockType::AwbBgStats => "AWBBG",
            BlockType::HdrBHistStats => "HDRBHist",
        }
    }

    /// Position of this block in pipeline order
    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether this block produces statistics rather than image corrections
    pub fn is_stats(&self) -> bool {
        matches!(self, BlockType::AwbBgStats | BlockType::HdrBHistStats)
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sensor output color format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SensorFormat {
    /// Standard 2x2 Bayer mosaic
    #[default]
    Bayer,
    /// Monochrome sensor
    Mono,
    /// Quad-Bayer (4-cell) mosaic
    QuadCfa,
}

/// Scalar capture-context value a calibration may depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlVariable {
    LensZoom,
    LuxIndex,
    Gain,
    DrcGain,
    ExposureTimeRatio,
    ExposureSensitivityRatio,
    ColorTemperature,
    LensPosition,
    TotalScaleRatio,
    PreScaleRatio,
    PostScaleRatio,
}

impl ControlVariable {
    /// All control variables, in snapshot field order
    pub const ALL: [ControlVariable; 11] = [
        ControlVariable::LensZoom,
        ControlVariable::LuxIndex,
        ControlVariable::Gain,
        ControlVariable::DrcGain,
        ControlVariable::ExposureTimeRatio,
        ControlVariable::ExposureSensitivityRatio,
        ControlVariable::ColorTemperature,
        ControlVariable::LensPosition,
        ControlVariable::TotalScaleRatio,
        ControlVariable::PreScaleRatio,
        ControlVariable::PostScaleRatio,
    ];
}

/// Immutable per-frame copy of the trigger values interpolation depends on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerSnapshot {
    pub lens_zoom: f32,
    pub lux_index: f32,
    pub aec_gain: f32,
    pub drc_gain: f32,
    pub exposure_time_ratio: f32,
    pub exposure_sensitivity_ratio: f32,
    pub color_temperature: f32,
    pub lens_position: f32,
    pub total_scale_ratio: f32,
    pub pre_scale_ratio: f32,
    pub post_scale_ratio: f32,
}

impl Default for TriggerSnapshot {
    fn default() -> Self {
        Self {
            lens_zoom: 1.0,
            lux_index: 350.0,
            aec_gain: 1.0,
            drc_gain: 1.0,
            exposure_time_ratio: 1.0,
            exposure_sensitivity_ratio: 1.0,
            color_temperature: 5000.0,
            lens_position: 0.0,
            total_scale_ratio: 1.0,
            pre_scale_ratio: 1.0,
            post_scale_ratio: 1.0,
        }
    }
}

impl TriggerSnapshot {
    /// Read the value of a single control variable
    pub fn value(&self, var: ControlVariable) -> f32 {
        match var {
            ControlVariable::LensZoom => self.lens_zoom,
            ControlVariable::LuxIndex => self.lux_index,
            ControlVariable::Gain => self.aec_gain,
            ControlVariable::DrcGain => self.drc_gain,
            ControlVariable::ExposureTimeRatio => self.exposure_time_ratio,
            ControlVariable::ExposureSensitivityRatio => self.exposure_sensitivity_ratio,
            ControlVariable::ColorTemperature => self.color_temperature,
            ControlVariable::LensPosition => self.lens_position,
            ControlVariable::TotalScaleRatio => self.total_scale_ratio,
            ControlVariable::PreScaleRatio => self.pre_scale_ratio,
            ControlVariable::PostScaleRatio => self.post_scale_ratio,
        }
    }

    /// Field-by-field comparison. Returns the variables whose values differ.
    ///
    /// Values are compared bitwise so that a NaN trigger compares equal to
    /// itself and does not force recomputation every frame.
    pub fn changed_fields(&self, other: &TriggerSnapshot) -> Vec<ControlVariable> {
        ControlVariable::ALL
            .iter()
            .copied()
            .filter(|&var| self.value(var).to_bits() != other.value(var).to_bits())
            .collect()
    }
}

/// Android-style noise reduction mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum NoiseReductionMode {
    Off,
    #[default]
    Fast,
    HighQuality,
    Minimal,
    ZeroShutterLag,
}

/// Android-style tonemap mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TonemapMode {
    /// Application supplies its own curve; hardware tone blocks are off
    /// while the curve has points
    ContrastCurve,
    #[default]
    Fast,
    HighQuality,
    GammaValue,
    PresetCurve,
}

/// Android-style lens shading mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ShadingMode {
    Off,
    #[default]
    Fast,
    HighQuality,
}

/// Android-style hot pixel mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum HotPixelMode {
    Off,
    #[default]
    Fast,
    HighQuality,
}

/// Frame-level capture controls
///
/// These are evaluated after every other enable rule and always win: a block
/// forced off here stays off for the frame regardless of overrides or
/// calibration state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameControls {
    #[serde(default)]
    pub noise_reduction: NoiseReductionMode,
    #[serde(default)]
    pub tonemap: TonemapMode,
    /// Points in the application tonemap curve
    #[serde(default)]
    pub tonemap_curve_points: u32,
    #[serde(default)]
    pub shading: ShadingMode,
    #[serde(default)]
    pub hot_pixel: HotPixelMode,
    /// Per-request bypass lock: blocks listed here are held off for the frame
    #[serde(default)]
    pub bypass: BTreeSet<BlockType>,
}

impl FrameControls {
    /// Whether these controls force `block` off for the frame
    pub fn forces_disable(&self, block: BlockType) -> bool {
        if self.bypass.contains(&block) {
            return true;
        }
        match block {
            BlockType::Abf | BlockType::Hnr => self.noise_reduction == NoiseReductionMode::Off,
            BlockType::Gtm | BlockType::Gamma => {
                self.tonemap == TonemapMode::ContrastCurve && self.tonemap_curve_points != 0
            }
            BlockType::Lsc => self.shading == ShadingMode::Off,
            BlockType::BpcPdpc => self.hot_pixel == HotPixelMode::Off,
            _ => false,
        }
    }
}

/// Explicit manual IQ override for one block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManualIqSetting {
    /// Authoritative enable for the block while the override is present
    pub enable: bool,
}

/// Double-buffer bank selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LutBank {
    #[default]
    Bank0,
    Bank1,
}

impl LutBank {
    /// The opposite bank
    pub fn flipped(self) -> LutBank {
        match self {
            LutBank::Bank0 => LutBank::Bank1,
            LutBank::Bank1 => LutBank::Bank0,
        }
    }

    /// Flip in place
    pub fn flip(&mut self) {
        *self = self.flipped();
    }

    /// Register encoding of the bank (0 or 1)
    pub fn index(self) -> u32 {
        match self {
            LutBank::Bank0 => 0,
            LutBank::Bank1 => 1,
        }
    }
}

/// Region of interest in sensor coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}
