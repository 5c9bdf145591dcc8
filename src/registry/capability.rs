//! Capability flags for blocks and revisions.

use crate::types::{ChipRevision, SensorFormat};
use serde::Serialize;

bitflags::bitflags! {
    /// Per-block, per-revision capability bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BlockCaps: u32 {
        /// Runs on Bayer sensors
        const BAYER = 1 << 0;
        /// Runs on monochrome sensors
        const MONO = 1 << 1;
        /// Runs on Quad-CFA sensors
        const QUAD_CFA = 1 << 2;
        /// Calibration may toggle features through hysteresis triggers
        const DYNAMIC_ENABLE = 1 << 3;
        /// LUT payload is double-buffered in hardware
        const DOUBLE_BUFFERED_LUT = 1 << 4;
        /// Block produces statistics output
        const STATS_OUTPUT = 1 << 5;

        const ALL_FORMATS = Self::BAYER.bits() | Self::MONO.bits() | Self::QUAD_CFA.bits();
        const COLOR_FORMATS = Self::BAYER.bits() | Self::QUAD_CFA.bits();
    }
}

impl BlockCaps {
    /// Whether these caps admit the given sensor format
    pub fn supports_format(self, format: SensorFormat) -> bool {
        let bit = match format {
            SensorFormat::Bayer => BlockCaps::BAYER,
            SensorFormat::Mono => BlockCaps::MONO,
            SensorFormat::QuadCfa => BlockCaps::QUAD_CFA,
        };
        self.contains(bit)
    }
}

bitflags::bitflags! {
    /// Supported UBWC (compressed format) versions
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct UbwcVersions: u32 {
        const V1 = 1 << 0;
        const V2 = 1 << 1;
        const V3 = 1 << 2;
        const V4 = 1 << 3;
    }
}

/// Revision capability summary for the BPS segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BpsCapability {
    /// Bitmask of supported UBWC versions
    pub ubwc_versions: u32,
    /// Whether lossy UBWC is supported
    pub ubwc_lossy: bool,
    /// Image correction and adjustment version (major, minor)
    pub ica_version: (u8, u8),
    /// Lens distortion correction support
    pub ldc_supported: bool,
    /// Tone-map control version, if the revision carries one
    pub tmc_version: Option<(u8, u8)>,
}

impl BpsCapability {
    pub fn for_revision(revision: ChipRevision) -> Self {
        match revision {
            ChipRevision::Titan150 | ChipRevision::Titan160 => Self {
                ubwc_versions: UbwcVersions::V2.bits(),
                ubwc_lossy: false,
                ica_version: (1, 0),
                ldc_supported: false,
                tmc_version: None,
            },
            ChipRevision::Titan170 | ChipRevision::Titan175 => Self {
                ubwc_versions: (UbwcVersions::V2 | UbwcVersions::V3).bits(),
                ubwc_lossy: false,
                ica_version: (1, 0),
                ldc_supported: false,
                tmc_version: Some((1, 1)),
            },
            ChipRevision::Titan480 => Self {
                ubwc_versions: (UbwcVersions::V3 | UbwcVersions::V4).bits(),
                ubwc_lossy: true,
                ica_version: (2, 0),
                ldc_supported: true,
                tmc_version: Some((1, 2)),
            },
        }
    }

    pub fn supports_ubwc(&self, version: UbwcVersions) -> bool {
        UbwcVersions::from_bits_truncate(self.ubwc_versions).contains(version)
    }
}
