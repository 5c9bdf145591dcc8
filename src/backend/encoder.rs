//! Hardware encode boundary
//!
//! Turns calculated register values into the block's command payload. The
//! payload format belongs to the firmware; the pipeline only sizes the
//! destination and asks the encoder to fill it.

use crate::pipeline::error::PipelineResult;
use crate::pipeline::id::BufferId;
use crate::types::{BlockType, ChipRevision, LutBank};

/// Values handed to the encoder every frame a block is enabled
#[derive(Debug, Clone, Copy)]
pub struct RegisterValues<'a> {
    pub block: BlockType,
    pub enable: bool,
    pub bank: LutBank,
    pub registers: &'a [u32],
    /// Committed LUT buffer the command references, if the block has one
    pub lut: Option<BufferId>,
}

pub trait HwEncoder: Send + Sync {
    /// Command payload length in 32-bit words
    fn payload_length(&self, block: BlockType, revision: ChipRevision) -> usize;

    /// Encode `values` into `dest`, which is exactly `payload_length` words
    fn encode(&self, values: &RegisterValues<'_>, dest: &mut [u32]) -> PipelineResult<()>;

    /// Human-readable register dump, diagnostics only
    fn dump_debug_view(&self, block: BlockType, registers: &[u32]) -> String;
}
