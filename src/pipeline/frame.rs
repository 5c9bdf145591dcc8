//! Per-frame request and output types.

use crate::backend::tuning::TuningSelector;
use crate::pipeline::id::RequestId;
use crate::pipeline::lut_pool::CommittedLut;
use crate::types::{
    BlockType, ChipRevision, FrameControls, LutBank, ManualIqSetting, Roi, TriggerSnapshot,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// One capture request as seen by the BPS pipeline
#[derive(Debug, Clone, Default)]
pub struct FrameRequest {
    pub request_id: RequestId,
    pub selector: TuningSelector,
    pub trigger: TriggerSnapshot,
    pub controls: FrameControls,
    /// Manual IQ settings by block
    pub manual: BTreeMap<BlockType, ManualIqSetting>,
    /// Copy computed LUTs into the debug record
    pub tuning_capture: bool,
    /// Blocks whose register dump is logged after calculation
    pub dump_reg_config: BTreeSet<BlockType>,
}

impl FrameRequest {
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            ..Default::default()
        }
    }

    pub fn with_selector(mut self, selector: TuningSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_trigger(mut self, trigger: TriggerSnapshot) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_controls(mut self, controls: FrameControls) -> Self {
        self.controls = controls;
        self
    }

    pub fn with_manual(mut self, block: BlockType, enable: bool) -> Self {
        self.manual.insert(block, ManualIqSetting { enable });
        self
    }

    pub fn with_tuning_capture(mut self, enable: bool) -> Self {
        self.tuning_capture = enable;
        self
    }

    pub fn with_reg_dump(mut self, block: BlockType) -> Self {
        self.dump_reg_config.insert(block);
        self
    }

    pub fn manual_for(&self, block: BlockType) -> Option<ManualIqSetting> {
        self.manual.get(&block).copied()
    }
}

/// Command payload of one enabled block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEntry {
    pub block: BlockType,
    pub bank: LutBank,
    pub payload: Vec<u32>,
    /// Committed LUT buffer referenced by the payload
    pub lut: Option<CommittedLut>,
}

/// Commands for one request, in pipeline order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandList {
    pub request_id: RequestId,
    pub entries: Vec<CommandEntry>,
}

impl CommandList {
    pub fn entry(&self, block: BlockType) -> Option<&CommandEntry> {
        self.entries.iter().find(|e| e.block == block)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total payload words across all entries
    pub fn payload_words(&self) -> usize {
        self.entries.iter().map(|e| e.payload.len()).sum()
    }
}

/// Per-block entry of the frame metadata record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockMetadata {
    pub block: BlockType,
    pub enabled: bool,
    /// Registers and LUTs were recomputed this frame
    pub adjusted: bool,
    /// Bank of the committed LUT referenced this frame
    pub bank: Option<LutBank>,
    pub coefficients: Vec<f32>,
    pub gains: Vec<f32>,
    pub region: Option<Roi>,
}

/// Metadata published for one frame, one entry per active block
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameMetadataRecord {
    pub request_id: RequestId,
    pub revision: ChipRevision,
    pub blocks: Vec<BlockMetadata>,
}

impl FrameMetadataRecord {
    pub fn block(&self, block: BlockType) -> Option<&BlockMetadata> {
        self.blocks.iter().find(|b| b.block == block)
    }

    pub fn enabled_blocks(&self) -> impl Iterator<Item = BlockType> + '_ {
        self.blocks.iter().filter(|b| b.enabled).map(|b| b.block)
    }
}

/// Everything a successful request produces
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub commands: CommandList,
    pub metadata: FrameMetadataRecord,
    /// Blocks whose recomputation ran this frame
    pub recomputed: Vec<BlockType>,
    /// Non-fatal capture failures, already logged
    pub capture_warnings: Vec<(BlockType, String)>,
}
