//! Revision-specific hardware settings.
//!
//! Each block picks one [`HwStrategy`] at construction time from its chip
//! revision family. The strategy owns the block's hardware setting: the named
//! LUT segments that make up its DMI payload and the size of its tuning
//! metadata slot. It is dropped together with the block.

use crate::error::{BpsError, Result};
use crate::registry::ModuleVersion;
use crate::types::{BlockType, ChipRevision, RevisionFamily};

/// Debug data type id for arrays of 32-bit LUT words
pub const DEBUG_TYPE_U32_ARRAY: u32 = 0x0004;

/// One named table inside a block's DMI payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LutSegment {
    pub name: &'static str,
    pub entries: usize,
}

const fn seg(name: &'static str, entries: usize) -> LutSegment {
    LutSegment { name, entries }
}

/// Hardware setting owned by a block for the lifetime of the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HwSetting {
    pub block: BlockType,
    pub revision: ChipRevision,
    pub version: ModuleVersion,
    pub segments: Vec<LutSegment>,
    /// Capacity of the per-frame tuning metadata slot, in bytes
    pub tuning_capacity: usize,
}

impl HwSetting {
    fn new(
        block: BlockType,
        revision: ChipRevision,
        version: ModuleVersion,
        segments: &[LutSegment],
    ) -> Self {
        let words: usize = segments.iter().map(|s| s.entries).sum();
        Self {
            block,
            revision,
            version,
            segments: segments.to_vec(),
            tuning_capacity: words * std::mem::size_of::<u32>(),
        }
    }
}

/// Everything a block factory needs to build a block's strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockCreateData {
    pub block: BlockType,
    pub revision: ChipRevision,
    pub module_version: ModuleVersion,
    pub request_queue_depth: usize,
    pub node_identifier: u32,
}

/// Debug tag a block's tuning capture is written under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DebugTag {
    pub id: u32,
    pub type_id: u32,
}

/// Closed set of per-revision strategies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HwStrategy {
    Titan17x(HwSetting),
    Titan480(HwSetting),
}

impl HwStrategy {
    /// Factory for image-correction blocks
    pub fn create_iq(data: &BlockCreateData) -> Result<HwStrategy> {
        if data.block.is_stats() {
            return Err(BpsError::BlockCreation {
                block: data.block,
                message: "statistics block passed to the IQ factory".into(),
            });
        }
        Self::create(data)
    }

    /// Factory for statistics blocks
    pub fn create_stats(data: &BlockCreateData) -> Result<HwStrategy> {
        if !data.block.is_stats() {
            return Err(BpsError::BlockCreation {
                block: data.block,
                message: "IQ block passed to the statistics factory".into(),
            });
        }
        Self::create(data)
    }

    fn create(data: &BlockCreateData) -> Result<HwStrategy> {
        let family = data.revision.family();
        let segments = lut_layout(data.block, data.module_version, family).ok_or_else(|| {
            BpsError::BlockCreation {
                block: data.block,
                message: format!(
                    "module version {} is not implemented for {}",
                    data.module_version, data.revision
                ),
            }
        })?;
        let setting = HwSetting::new(data.block, data.revision, data.module_version, segments);
        tracing::trace!(
            "{}: created {} strategy, {} LUT words",
            data.block,
            family,
            setting.segments.iter().map(|s| s.entries).sum::<usize>()
        );
        Ok(match family {
            RevisionFamily::Titan17x => HwStrategy::Titan17x(setting),
            RevisionFamily::Titan480 => HwStrategy::Titan480(setting),
        })
    }

    pub fn family(&self) -> RevisionFamily {
        match self {
            HwStrategy::Titan17x(_) => RevisionFamily::Titan17x,
            HwStrategy::Titan480(_) => RevisionFamily::Titan480,
        }
    }

    pub fn setting(&self) -> &HwSetting {
        match self {
            HwStrategy::Titan17x(s) | HwStrategy::Titan480(s) => s,
        }
    }

    pub fn segments(&self) -> &[LutSegment] {
        &self.setting().segments
    }

    /// Total DMI payload length in 32-bit words
    pub fn dmi_length(&self) -> usize {
        self.segments().iter().map(|s| s.entries).sum()
    }

    pub fn has_lut(&self) -> bool {
        self.dmi_length() > 0
    }

    pub fn tuning_capacity_bytes(&self) -> usize {
        self.setting().tuning_capacity
    }

    /// Debug tag keyed by block and chip revision
    pub fn debug_tag(&self) -> DebugTag {
        let setting = self.setting();
        let revision_code = match setting.revision {
            ChipRevision::Titan150 => 0x50,
            ChipRevision::Titan160 => 0x60,
            ChipRevision::Titan170 => 0x70,
            ChipRevision::Titan175 => 0x75,
            ChipRevision::Titan480 => 0x80,
        };
        DebugTag {
            id: 0x0B00_0000 | ((setting.block.index() as u32) << 8) | revision_code,
            type_id: DEBUG_TYPE_U32_ARRAY,
        }
    }
}

/// LUT layout for a block version on a revision family. `None` when that
/// version has no implementation for the family.
fn lut_layout(
    block: BlockType,
    version: ModuleVersion,
    family: RevisionFamily,
) -> Option<&'static [LutSegment]> {
    use RevisionFamily::{Titan17x, Titan480};

    const PEDESTAL: &[LutSegment] = &[seg("gr_r", 130), seg("gb_b", 130)];
    const LINEARIZATION: &[LutSegment] = &[seg("knee", 36)];
    const BPCPDPC_V20: &[LutSegment] = &[seg("pdaf_mask", 64)];
    const BPCPDPC_V30: &[LutSegment] = &[seg("pdaf_mask", 64), seg("noise", 64)];
    const ABF_17X: &[LutSegment] = &[
        seg("noise", 64),
        seg("noise1", 64),
        seg("activity", 32),
        seg("dark", 42),
    ];
    const ABF_480: &[LutSegment] = &[seg("noise", 64), seg("activity", 32), seg("dark", 42)];
    const LSC_V34: &[LutSegment] = &[seg("mesh_r_gr", 221), seg("mesh_gb_b", 221)];
    const LSC_V40: &[LutSegment] = &[
        seg("mesh_r_gr", 221),
        seg("mesh_gb_b", 221),
        seg("grid", 442),
    ];
    const GIC: &[LutSegment] = &[seg("noise_std", 64)];
    const GTM: &[LutSegment] = &[seg("tone_curve", 128)];
    const GAMMA: &[LutSegment] = &[seg("channel_g", 256), seg("channel_b", 256), seg("channel_r", 256)];
    const HNR: &[LutSegment] = &[
        seg("lnr_gain", 33),
        seg("fnr_gain", 17),
        seg("fnr_ac", 17),
        seg("snr_gain", 17),
        seg("blend_lnr", 17),
        seg("blend_snr", 17),
    ];
    const NONE: &[LutSegment] = &[];

    let v = (version.major, version.minor);
    match (block, v, family) {
        (BlockType::PedestalCorrection, (1, 3), _) => Some(PEDESTAL),
        (BlockType::Linearization, (3, 3), Titan17x) => Some(LINEARIZATION),
        (BlockType::Linearization, (3, 4), Titan480) => Some(LINEARIZATION),
        (BlockType::BpcPdpc, (2, 0), Titan17x) => Some(BPCPDPC_V20),
        (BlockType::BpcPdpc, (3, 0), Titan480) => Some(BPCPDPC_V30),
        (BlockType::Demux, (1, 3), _) => Some(NONE),
        (BlockType::Hdr, (2, 2), Titan17x) => Some(NONE),
        (BlockType::Hdr, (3, 0), Titan480) => Some(NONE),
        (BlockType::Abf, (4, 0), Titan17x) => Some(ABF_17X),
        (BlockType::Abf, (4, 0), Titan480) => Some(ABF_480),
        (BlockType::Lsc, (3, 4), Titan17x) => Some(LSC_V34),
        (BlockType::Lsc, (4, 0), Titan480) => Some(LSC_V40),
        (BlockType::Gic, (3, 0), _) => Some(GIC),
        (BlockType::Demosaic, (3, 6), _) => Some(NONE),
        (BlockType::ColorCorrection, (1, 3), _) => Some(NONE),
        (BlockType::Gtm, (1, 0), _) => Some(GTM),
        (BlockType::Gamma, (1, 6), _) => Some(GAMMA),
        (BlockType::Cst, (1, 2), _) => Some(NONE),
        (BlockType::ChromaSubSample, (1, 0), _) => Some(NONE),
        (BlockType::Hnr, (1, 0), Titan17x) => Some(HNR),
        (BlockType::WhiteBalance, (1, 3), _) => Some(NONE),
        (BlockType::AwbBgStats, (1, 4), _) => Some(NONE),
        (BlockType::HdrBHistStats, (1, 3), _) => Some(NONE),
        _ => None,
    }
}
