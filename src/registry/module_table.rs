//! Static per-revision module tables and the pipeline assembler.
//!
//! The tables below list every BPS block in pipeline order for each revision
//! family, with its module version, capability bits and factory. They are
//! plain data; [`PipelineAssembler`] only validates and filters them.

use crate::config::ModuleOverride;
use crate::error::{BpsError, Result};
use crate::pipeline::strategy::{BlockCreateData, HwStrategy};
use crate::registry::capability::{BlockCaps, BpsCapability};
use crate::types::{BlockType, ChipRevision, RevisionFamily, SensorFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Instant;

/// Block factory: builds the revision-specific strategy for one block
pub type BlockFactory = fn(&BlockCreateData) -> Result<HwStrategy>;

/// Hardware module version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleVersion {
    pub major: u8,
    pub minor: u8,
}

impl ModuleVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    pub fn is_zero(&self) -> bool {
        self.major == 0 && self.minor == 0
    }
}

impl fmt::Display for ModuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// One row of a module table
#[derive(Clone, Copy)]
pub struct HardwareBlockDescriptor {
    pub block: BlockType,
    /// Whether the block exists on this revision
    pub installed: bool,
    pub module_version: ModuleVersion,
    pub caps: BlockCaps,
    pub factory: BlockFactory,
}

impl fmt::Debug for HardwareBlockDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareBlockDescriptor")
            .field("block", &self.block)
            .field("installed", &self.installed)
            .field("module_version", &self.module_version)
            .field("caps", &self.caps)
            .finish_non_exhaustive()
    }
}

const IQ_ALL: u32 = BlockCaps::ALL_FORMATS.bits();
const IQ_COLOR: u32 = BlockCaps::COLOR_FORMATS.bits();
const DYN: u32 = BlockCaps::DYNAMIC_ENABLE.bits();
const LUT2: u32 = BlockCaps::DOUBLE_BUFFERED_LUT.bits();
const STATS: u32 = BlockCaps::STATS_OUTPUT.bits() | BlockCaps::ALL_FORMATS.bits();

const fn iq(block: BlockType, major: u8, minor: u8, caps: u32) -> HardwareBlockDescriptor {
    HardwareBlockDescriptor {
        block,
        installed: true,
        module_version: ModuleVersion::new(major, minor),
        caps: BlockCaps::from_bits_retain(caps),
        factory: HwStrategy::create_iq,
    }
}

const fn stats(block: BlockType, major: u8, minor: u8) -> HardwareBlockDescriptor {
    HardwareBlockDescriptor {
        block,
        installed: true,
        module_version: ModuleVersion::new(major, minor),
        caps: BlockCaps::from_bits_retain(STATS),
        factory: HwStrategy::create_stats,
    }
}

const fn absent(mut desc: HardwareBlockDescriptor) -> HardwareBlockDescriptor {
    desc.installed = false;
    desc
}

/// Module table for Titan 150/160/170/175
pub static TITAN17X_MODULES: [HardwareBlockDescriptor; 18] = [
    iq(BlockType::PedestalCorrection, 1, 3, IQ_ALL | LUT2),
    iq(BlockType::Linearization, 3, 3, IQ_ALL | LUT2),
    iq(BlockType::BpcPdpc, 2, 0, IQ_ALL | LUT2),
    iq(BlockType::Demux, 1, 3, IQ_ALL),
    iq(BlockType::Hdr, 2, 2, IQ_COLOR),
    iq(BlockType::Abf, 4, 0, IQ_ALL | DYN | LUT2),
    iq(BlockType::Lsc, 3, 4, IQ_ALL | LUT2),
    iq(BlockType::Gic, 3, 0, IQ_COLOR | LUT2),
    iq(BlockType::Demosaic, 3, 6, IQ_COLOR),
    iq(BlockType::ColorCorrection, 1, 3, IQ_COLOR),
    iq(BlockType::Gtm, 1, 0, IQ_ALL | LUT2),
    iq(BlockType::Gamma, 1, 6, IQ_ALL | LUT2),
    iq(BlockType::Cst, 1, 2, IQ_COLOR),
    iq(BlockType::ChromaSubSample, 1, 0, IQ_COLOR),
    iq(BlockType::Hnr, 1, 0, IQ_ALL | DYN | LUT2),
    iq(BlockType::WhiteBalance, 1, 3, IQ_COLOR),
    stats(BlockType::AwbBgStats, 1, 4),
    stats(BlockType::HdrBHistStats, 1, 3),
];

/// Module table for Titan 480
pub static TITAN480_MODULES: [HardwareBlockDescriptor; 18] = [
    iq(BlockType::PedestalCorrection, 1, 3, IQ_ALL | LUT2),
    iq(BlockType::Linearization, 3, 4, IQ_ALL | LUT2),
    iq(BlockType::BpcPdpc, 3, 0, IQ_ALL | LUT2),
    iq(BlockType::Demux, 1, 3, IQ_ALL),
    iq(BlockType::Hdr, 3, 0, IQ_COLOR),
    iq(BlockType::Abf, 4, 0, IQ_ALL | DYN | LUT2),
    iq(BlockType::Lsc, 4, 0, IQ_ALL | LUT2),
    iq(BlockType::Gic, 3, 0, IQ_COLOR | LUT2),
    iq(BlockType::Demosaic, 3, 6, IQ_COLOR),
    iq(BlockType::ColorCorrection, 1, 3, IQ_COLOR),
    iq(BlockType::Gtm, 1, 0, IQ_ALL | LUT2),
    iq(BlockType::Gamma, 1, 6, IQ_ALL | LUT2),
    iq(BlockType::Cst, 1, 2, IQ_COLOR),
    iq(BlockType::ChromaSubSample, 1, 0, IQ_COLOR),
    absent(iq(BlockType::Hnr, 1, 0, IQ_ALL | DYN | LUT2)),
    iq(BlockType::WhiteBalance, 1, 3, IQ_COLOR),
    stats(BlockType::AwbBgStats, 1, 4),
    stats(BlockType::HdrBHistStats, 1, 3),
];

/// Options that filter the module table
#[derive(Debug, Clone, Default)]
pub struct AssemblyOptions {
    pub sensor_format: SensorFormat,
    pub overrides: Vec<ModuleOverride>,
}

/// Statistics about an assembled plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanStats {
    /// Rows in the module table
    pub total_blocks: usize,

    /// Rows present on the hardware revision
    pub installed_blocks: usize,

    /// Installed blocks dropped because they do not support the sensor format
    pub filtered_by_format: usize,

    /// Blocks whose inclusion was decided by a config override
    pub overridden: usize,

    /// Blocks in the final plan
    pub active_blocks: usize,

    /// Assembly time in microseconds
    pub assemble_time_us: u64,
}

/// Ordered, filtered list of blocks for one revision
#[derive(Debug, Clone)]
pub struct ModulePlan {
    pub revision: ChipRevision,
    /// Active blocks in pipeline order
    pub blocks: Vec<HardwareBlockDescriptor>,
    pub capability: BpsCapability,
    pub stats: PlanStats,
}

impl ModulePlan {
    pub fn block_types(&self) -> Vec<BlockType> {
        self.blocks.iter().map(|d| d.block).collect()
    }

    pub fn contains(&self, block: BlockType) -> bool {
        self.blocks.iter().any(|d| d.block == block)
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Builds module plans from the static tables
pub struct PipelineAssembler;

impl PipelineAssembler {
    /// The static module table for a revision
    pub fn table(revision: ChipRevision) -> &'static [HardwareBlockDescriptor] {
        match revision.family() {
            RevisionFamily::Titan17x => &TITAN17X_MODULES,
            RevisionFamily::Titan480 => &TITAN480_MODULES,
        }
    }

    /// Capability summary for a raw revision id
    pub fn capability(raw_revision: u32) -> Result<BpsCapability> {
        let revision = ChipRevision::from_raw(raw_revision)
            .ok_or(BpsError::UnsupportedRevision { raw: raw_revision })?;
        Ok(BpsCapability::for_revision(revision))
    }

    /// Assemble the plan for a raw revision id
    pub fn assemble(raw_revision: u32, options: &AssemblyOptions) -> Result<ModulePlan> {
        let Some(revision) = ChipRevision::from_raw(raw_revision) else {
            tracing::error!("Unsupported chip revision 0x{:08X}", raw_revision);
            return Err(BpsError::UnsupportedRevision { raw: raw_revision });
        };
        Self::assemble_from(revision, Self::table(revision), options)
    }

    /// Assemble from an explicit table. The table is validated first; no plan
    /// is produced for a malformed table.
    pub fn assemble_from(
        revision: ChipRevision,
        table: &[HardwareBlockDescriptor],
        options: &AssemblyOptions,
    ) -> Result<ModulePlan> {
        let start = Instant::now();
        Self::validate_table(table)?;

        for ov in &options.overrides {
            match table.iter().find(|d| d.block == ov.block) {
                None => {
                    return Err(BpsError::Config(format!(
                        "override for {} which is not in the {} module table",
                        ov.block, revision
                    )))
                }
                Some(desc) if ov.enable && !desc.installed => {
                    return Err(BpsError::Config(format!(
                        "cannot enable {}: not present on {}",
                        ov.block, revision
                    )))
                }
                Some(_) => {}
            }
        }

        let mut stats = PlanStats {
            total_blocks: table.len(),
            ..Default::default()
        };
        let mut blocks = Vec::with_capacity(table.len());

        for desc in table {
            if !desc.installed {
                continue;
            }
            stats.installed_blocks += 1;

            let format_ok = desc.caps.supports_format(options.sensor_format);
            let include = match options.overrides.iter().find(|o| o.block == desc.block) {
                Some(ov) => {
                    stats.overridden += 1;
                    ov.enable
                }
                None => {
                    if !format_ok {
                        stats.filtered_by_format += 1;
                    }
                    format_ok
                }
            };

            if include {
                blocks.push(*desc);
            } else {
                tracing::debug!("{}: excluded from {} plan", desc.block, revision);
            }
        }

        stats.active_blocks = blocks.len();
        stats.assemble_time_us = start.elapsed().as_micros() as u64;

        tracing::info!(
            "Assembled {} plan: {} of {} blocks active",
            revision,
            stats.active_blocks,
            stats.total_blocks
        );

        Ok(ModulePlan {
            revision,
            blocks,
            capability: BpsCapability::for_revision(revision),
            stats,
        })
    }

    fn validate_table(table: &[HardwareBlockDescriptor]) -> Result<()> {
        let mut seen = HashSet::new();
        let mut previous: Option<BlockType> = None;

        for desc in table {
            if !seen.insert(desc.block) {
                return Err(BpsError::MalformedModuleEntry {
                    block: desc.block,
                    message: "listed more than once".into(),
                });
            }
            if desc.module_version.is_zero() {
                return Err(BpsError::MalformedModuleEntry {
                    block: desc.block,
                    message: "module version 0.0".into(),
                });
            }
            if let Some(prev) = previous {
                if desc.block < prev {
                    return Err(BpsError::MalformedModuleEntry {
                        block: desc.block,
                        message: format!("listed after {}, out of pipeline order", prev),
                    });
                }
            }
            previous = Some(desc.block);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_are_valid_and_ordered() {
        for &rev in ChipRevision::all() {
            let table = PipelineAssembler::table(rev);
            assert!(PipelineAssembler::validate_table(table).is_ok());
            assert_eq!(table.len(), BlockType::all().len());
        }
    }

    #[test]
    fn test_unsupported_revision() {
        let result = PipelineAssembler::assemble(0x0003_0000, &AssemblyOptions::default());
        assert!(matches!(
            result,
            Err(BpsError::UnsupportedRevision { raw: 0x0003_0000 })
        ));
        assert!(PipelineAssembler::capability(0x0003_0000).is_err());
    }

    #[test]
    fn test_titan480_has_no_hnr() {
        let plan =
            PipelineAssembler::assemble(ChipRevision::Titan480.raw(), &AssemblyOptions::default())
                .unwrap();
        assert!(!plan.contains(BlockType::Hnr));
        assert_eq!(plan.stats.installed_blocks, 17);
        assert_eq!(plan.stats.active_blocks, 17);

        let plan =
            PipelineAssembler::assemble(ChipRevision::Titan170.raw(), &AssemblyOptions::default())
                .unwrap();
        assert!(plan.contains(BlockType::Hnr));
    }

    #[test]
    fn test_mono_filters_color_blocks() {
        let options = AssemblyOptions {
            sensor_format: SensorFormat::Mono,
            overrides: Vec::new(),
        };
        let plan = PipelineAssembler::assemble(ChipRevision::Titan175.raw(), &options).unwrap();
        assert!(!plan.contains(BlockType::Demosaic));
        assert!(!plan.contains(BlockType::WhiteBalance));
        assert!(plan.contains(BlockType::Abf));
        assert!(plan.stats.filtered_by_format > 0);

        let types = plan.block_types();
        let mut sorted = types.clone();
        sorted.sort();
        assert_eq!(types, sorted);
    }

    #[test]
    fn test_override_disable_and_force() {
        let options = AssemblyOptions {
            sensor_format: SensorFormat::Mono,
            overrides: vec![
                ModuleOverride {
                    block: BlockType::Gamma,
                    enable: false,
                },
                ModuleOverride {
                    block: BlockType::Demosaic,
                    enable: true,
                },
            ],
        };
        let plan = PipelineAssembler::assemble(ChipRevision::Titan480.raw(), &options).unwrap();
        assert!(!plan.contains(BlockType::Gamma));
        assert!(plan.contains(BlockType::Demosaic));
        assert_eq!(plan.stats.overridden, 2);
    }

    #[test]
    fn test_cannot_enable_absent_block() {
        let options = AssemblyOptions {
            sensor_format: SensorFormat::Bayer,
            overrides: vec![ModuleOverride {
                block: BlockType::Hnr,
                enable: true,
            }],
        };
        let err = PipelineAssembler::assemble(ChipRevision::Titan480.raw(), &options).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_malformed_tables() {
        let dup = [TITAN17X_MODULES[0], TITAN17X_MODULES[0]];
        let err = PipelineAssembler::assemble_from(
            ChipRevision::Titan170,
            &dup,
            &AssemblyOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, BpsError::MalformedModuleEntry { .. }));

        let mut zero = TITAN17X_MODULES[5];
        zero.module_version = ModuleVersion::new(0, 0);
        assert!(PipelineAssembler::assemble_from(
            ChipRevision::Titan170,
            &[zero],
            &AssemblyOptions::default()
        )
        .is_err());

        let reversed = [TITAN17X_MODULES[5], TITAN17X_MODULES[1]];
        assert!(PipelineAssembler::assemble_from(
            ChipRevision::Titan170,
            &reversed,
            &AssemblyOptions::default()
        )
        .is_err());
    }
}
