//! Interpolation and calculation interfaces
//!
//! The numeric routines of each block live outside this crate. The pipeline
//! drives them through two traits:
//!
//! - [`Interpolator`] - Re-interpolates calibration coefficients for the
//!   current trigger snapshot
//! - [`IqCalculator`] - Computes register values and LUT words for a block

use crate::backend::tuning::CalibrationRef;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::strategy::LutSegment;
use crate::types::{BlockType, ChipRevision, LutBank, ManualIqSetting, Roi, TriggerSnapshot};
use serde::{Deserialize, Serialize};

/// Interpolation output, owned by a block and reused across frames
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterpolatedState {
    pub coefficients: Vec<f32>,
    /// Incremented every time the interpolator reports a change
    pub generation: u64,
}

/// Trigger/interpolation service contract
pub trait Interpolator: Send + Sync {
    /// Update `state` for the given trigger and calibration. Returns whether
    /// the interpolated values changed.
    fn try_update(
        &self,
        block: BlockType,
        trigger: &TriggerSnapshot,
        calibration: &CalibrationRef,
        state: &mut InterpolatedState,
    ) -> bool;
}

/// Everything a calculation routine sees for one block and frame
#[derive(Debug, Clone, Copy)]
pub struct CalcInput<'a> {
    pub block: BlockType,
    pub revision: ChipRevision,
    pub calibration: Option<&'a CalibrationRef>,
    pub trigger: &'a TriggerSnapshot,
    pub interpolated: &'a InterpolatedState,
    /// Current per-feature enables, in calibration record order
    pub feature_enables: &'a [bool],
    /// Bank the LUT is being written for
    pub bank: LutBank,
    pub manual: Option<ManualIqSetting>,
    /// Layout of `lut`
    pub segments: &'a [LutSegment],
}

/// Firmware-facing values derived by a calculation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FirmwareData {
    pub coefficients: Vec<f32>,
    /// Stretch gains
    pub gains: Vec<f32>,
    /// Adjusted region, for blocks that crop or grid the frame
    pub region: Option<Roi>,
}

impl FirmwareData {
    /// Little-endian serialization used for the firmware property payload
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + 4 * (self.coefficients.len() + self.gains.len()) + 16);
        out.extend_from_slice(&(self.coefficients.len() as u32).to_le_bytes());
        for c in &self.coefficients {
            out.extend_from_slice(&c.to_le_bytes());
        }
        out.extend_from_slice(&(self.gains.len() as u32).to_le_bytes());
        for g in &self.gains {
            out.extend_from_slice(&g.to_le_bytes());
        }
        if let Some(roi) = self.region {
            for v in [roi.x, roi.y, roi.width, roi.height] {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        out
    }
}

/// Result of a successful calculation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalcOutput {
    /// Register values for the command payload
    pub registers: Vec<u32>,
    pub firmware: FirmwareData,
}

/// Numeric calculation routine for all blocks
pub trait IqCalculator: Send + Sync {
    /// Compute registers and fill `lut`. `lut` is exactly the block's DMI
    /// length and may be empty for blocks without LUTs.
    fn calculate(&self, input: &CalcInput<'_>, lut: &mut [u32]) -> PipelineResult<CalcOutput>;
}
