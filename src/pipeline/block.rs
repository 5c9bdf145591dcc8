//! One hardware block and its per-frame execution protocol.
//!
//! For every request a block:
//!
//! 1. Runs its dependency tracker to decide whether it changed.
//! 2. Recycles its LUT buffer when it turns off.
//! 3. When changed, interpolates, fetches a LUT buffer, calculates into it
//!    and commits it, then flips its bank.
//! 4. When enabled, encodes its command payload, changed or not.
//! 5. Publishes firmware metadata and, if requested, captures its LUTs.
//!
//! A failed calculation leaves the tracker as it was before the frame and
//! returns the fetched buffer to the pool unused. A panicking collaborator
//! gets the same rollback and surfaces as [`PipelineError::WorkerPanicked`].

use crate::backend::calc::{CalcInput, CalcOutput, FirmwareData, InterpolatedState};
use crate::backend::encoder::RegisterValues;
use crate::backend::{HwEncoder, Interpolator, IqCalculator, MetadataSink, TuningStore};
use crate::error::Result;
use crate::pipeline::adapters::BlockTags;
use crate::pipeline::capture::{capture_tuning, publish_firmware};
use crate::pipeline::dependency::{DependencyTracker, DetectorInput, Evaluation};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::frame::{BlockMetadata, CommandEntry, FrameRequest};
use crate::pipeline::id::{BlockId, RequestId};
use crate::pipeline::lut_pool::{CommittedLut, LutBufferPool, PoolStats};
use crate::pipeline::strategy::{BlockCreateData, HwStrategy};
use crate::registry::{HardwareBlockDescriptor, TagRegistry};
use crate::types::{BlockType, ChipRevision, LutBank};
use std::panic::{self, AssertUnwindSafe};

/// Collaborators a block needs while executing
#[derive(Clone, Copy)]
pub struct BlockServices<'a> {
    pub tuning: &'a dyn TuningStore,
    pub interpolator: &'a dyn Interpolator,
    pub calculator: &'a dyn IqCalculator,
    pub encoder: &'a dyn HwEncoder,
    pub metadata: &'a dyn MetadataSink,
}

/// State a block carries from frame to frame
#[derive(Debug)]
pub struct BlockRuntimeState {
    pub tracker: DependencyTracker,
    pub interpolated: InterpolatedState,
    /// Bank the next LUT will be written for
    pub bank: LutBank,
    /// Most recent committed LUT, referenced by every command until replaced
    pub current_lut: Option<CommittedLut>,
    pub registers: Vec<u32>,
    pub firmware: FirmwareData,
}

/// What one block did for one request
#[derive(Debug, Clone)]
pub struct BlockReport {
    pub block: BlockType,
    pub evaluation: Evaluation,
    pub recomputed: bool,
    pub command: Option<CommandEntry>,
    pub metadata: BlockMetadata,
    /// Non-fatal capture failure
    pub capture_error: Option<PipelineError>,
}

pub struct IqBlock {
    id: BlockId,
    descriptor: HardwareBlockDescriptor,
    revision: ChipRevision,
    strategy: HwStrategy,
    tags: BlockTags,
    pool: Option<LutBufferPool>,
    command_length: usize,
    state: BlockRuntimeState,
}

impl IqBlock {
    pub fn new(
        id: BlockId,
        descriptor: &HardwareBlockDescriptor,
        revision: ChipRevision,
        request_queue_depth: usize,
        tags: &TagRegistry,
        encoder: &dyn HwEncoder,
    ) -> Result<Self> {
        let block = descriptor.block;
        let data = BlockCreateData {
            block,
            revision,
            module_version: descriptor.module_version,
            request_queue_depth,
            node_identifier: id.0,
        };
        let strategy = (descriptor.factory)(&data)?;
        let tags = BlockTags::resolve(tags, block)?;
        let pool = strategy
            .has_lut()
            .then(|| LutBufferPool::new(block, request_queue_depth, strategy.dmi_length()));
        let command_length = encoder.payload_length(block, revision);

        tracing::debug!(
            "{}: created v{} for {} ({} LUT words, {} command words)",
            block,
            descriptor.module_version,
            revision,
            strategy.dmi_length(),
            command_length
        );

        Ok(Self {
            id,
            descriptor: *descriptor,
            revision,
            strategy,
            tags,
            pool,
            command_length,
            state: BlockRuntimeState {
                tracker: DependencyTracker::new(block),
                interpolated: InterpolatedState::default(),
                bank: LutBank::Bank0,
                current_lut: None,
                registers: Vec::new(),
                firmware: FirmwareData::default(),
            },
        })
    }

    pub fn execute(
        &mut self,
        request: &FrameRequest,
        services: &BlockServices<'_>,
    ) -> PipelineResult<BlockReport> {
        let block = self.descriptor.block;
        let checkpoint = self.state.tracker.clone();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run_protocol(request, services, &checkpoint)
        }));
        result.unwrap_or_else(|_| {
            tracing::error!("{}: collaborator panicked during {}", block, request.request_id);
            self.recover(checkpoint);
            Err(PipelineError::WorkerPanicked { block })
        })
    }

    fn run_protocol(
        &mut self,
        request: &FrameRequest,
        services: &BlockServices<'_>,
        checkpoint: &DependencyTracker,
    ) -> PipelineResult<BlockReport> {
        let block = self.descriptor.block;

        let input = DetectorInput {
            manual: request.manual_for(block),
            selector: &request.selector,
            trigger: &request.trigger,
            controls: &request.controls,
        };
        let evaluation = self.state.tracker.evaluate(&input, services.tuning);

        if evaluation.newly_disabled() {
            tracing::debug!("{}: disabled ({:?})", block, evaluation.reasons);
            self.release_current_lut()?;
        }

        // A block that lost its buffer to a failed frame must rebuild it
        let missing_lut =
            evaluation.enabled && self.pool.is_some() && self.state.current_lut.is_none();
        let recompute = evaluation.is_changed() || missing_lut;

        if recompute {
            tracing::trace!("{}: recompute ({:?})", block, evaluation.reasons);
            if let Err(e) = self.run_calculation(request, services) {
                tracing::error!("{}: {}", block, e);
                self.state.tracker = checkpoint.clone();
                return Err(e);
            }
            if request.dump_reg_config.contains(&block) {
                let view = services.encoder.dump_debug_view(block, &self.state.registers);
                tracing::debug!("{}", view);
            }
        }

        let command = if evaluation.enabled {
            Some(self.generate_command(services.encoder)?)
        } else {
            None
        };

        publish_firmware(
            services.metadata,
            request.request_id,
            block,
            &self.tags,
            evaluation.enabled,
            &self.state.firmware,
        )?;

        let capture_error = if request.tuning_capture && evaluation.enabled {
            self.capture(request.request_id, services.metadata).err()
        } else {
            None
        };
        if let Some(e) = &capture_error {
            tracing::warn!("{}: tuning capture skipped: {}", block, e);
        }

        let metadata = BlockMetadata {
            block,
            enabled: evaluation.enabled,
            adjusted: recompute,
            bank: if evaluation.enabled {
                self.state.current_lut.map(|l| l.bank)
            } else {
                None
            },
            coefficients: self.state.firmware.coefficients.clone(),
            gains: self.state.firmware.gains.clone(),
            region: self.state.firmware.region,
        };

        Ok(BlockReport {
            block,
            evaluation,
            recomputed: recompute,
            command,
            metadata,
            capture_error,
        })
    }

    fn run_calculation(
        &mut self,
        request: &FrameRequest,
        services: &BlockServices<'_>,
    ) -> PipelineResult<()> {
        let block = self.descriptor.block;

        if let Some(calibration) = self.state.tracker.calibration() {
            // The trigger diff already decided to recompute; an unchanged
            // interpolation only means the same coefficients are reused.
            let updated = services.interpolator.try_update(
                block,
                &request.trigger,
                calibration,
                &mut self.state.interpolated,
            );
            tracing::trace!(
                "{}: interpolation {} (generation {})",
                block,
                if updated { "updated" } else { "unchanged" },
                self.state.interpolated.generation
            );
        }

        let bank = self.state.bank;
        let dmi_length = self.strategy.dmi_length();
        let input = CalcInput {
            block,
            revision: self.revision,
            calibration: self.state.tracker.calibration(),
            trigger: &request.trigger,
            interpolated: &self.state.interpolated,
            feature_enables: self.state.tracker.feature_enables(),
            bank,
            manual: request.manual_for(block),
            segments: self.strategy.segments(),
        };

        let output: CalcOutput = match self.pool.as_mut() {
            Some(pool) => {
                let previous = self.state.current_lut.take().map(|l| l.handle);
                let handle = pool.fetch(previous)?;

                let result = match pool.begin_write(handle, dmi_length) {
                    Ok(lut) => services.calculator.calculate(&input, lut),
                    Err(e) => Err(e),
                };
                match result {
                    Ok(output) => {
                        self.state.current_lut = Some(pool.commit(handle, bank)?);
                        self.state.bank.flip();
                        output
                    }
                    Err(e) => {
                        if let Err(discard_err) = pool.discard(handle) {
                            tracing::error!("{}: {}", block, discard_err);
                        }
                        return Err(e);
                    }
                }
            }
            None => services.calculator.calculate(&input, &mut [])?,
        };

        self.state.registers = output.registers;
        self.state.firmware = output.firmware;
        Ok(())
    }

    fn generate_command(&self, encoder: &dyn HwEncoder) -> PipelineResult<CommandEntry> {
        let block = self.descriptor.block;
        let bank = self
            .state
            .current_lut
            .map(|l| l.bank)
            .unwrap_or(self.state.bank);
        let values = RegisterValues {
            block,
            enable: true,
            bank,
            registers: &self.state.registers,
            lut: self.state.current_lut.map(|l| l.handle.id),
        };
        let mut payload = vec![0u32; self.command_length];
        encoder.encode(&values, &mut payload)?;

        Ok(CommandEntry {
            block,
            bank,
            payload,
            lut: self.state.current_lut,
        })
    }

    fn capture(&self, request: RequestId, sink: &dyn MetadataSink) -> PipelineResult<usize> {
        let (Some(pool), Some(lut)) = (&self.pool, self.state.current_lut) else {
            return Ok(0);
        };
        let words = pool
            .words(lut.handle)
            .ok_or_else(|| PipelineError::DebugCapture {
                block: self.descriptor.block,
                message: "current LUT is not readable".into(),
            })?;
        capture_tuning(
            sink,
            request,
            self.descriptor.block,
            self.strategy.debug_tag(),
            self.strategy.segments(),
            words,
            self.strategy.tuning_capacity_bytes(),
        )
    }

    /// Undo a frame interrupted by a panic: restore the tracker and return
    /// any buffer left mid-write to the pool.
    fn recover(&mut self, checkpoint: DependencyTracker) {
        self.state.tracker = checkpoint;
        if let Some(pool) = self.pool.as_mut() {
            let reclaimed = pool.reclaim_writing();
            if reclaimed > 0 {
                tracing::warn!(
                    "{}: reclaimed {} buffer(s) left mid-write",
                    self.descriptor.block,
                    reclaimed
                );
            }
        }
    }

    fn release_current_lut(&mut self) -> PipelineResult<()> {
        if let (Some(pool), Some(lut)) = (self.pool.as_mut(), self.state.current_lut.take()) {
            pool.recycle(lut.handle)?;
        }
        Ok(())
    }

    /// Record that the request carrying `lut` went to the hardware
    pub fn mark_submitted(&mut self, request: RequestId, lut: &CommittedLut) -> PipelineResult<()> {
        match self.pool.as_mut() {
            Some(pool) => pool.mark_in_flight(lut.handle, request),
            None => Ok(()),
        }
    }

    /// Hardware finished `request`. Returns the number of buffers freed.
    pub fn release_request(&mut self, request: RequestId) -> usize {
        self.pool
            .as_mut()
            .map_or(0, |pool| pool.release_request(request))
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn block(&self) -> BlockType {
        self.descriptor.block
    }

    pub fn descriptor(&self) -> &HardwareBlockDescriptor {
        &self.descriptor
    }

    pub fn strategy(&self) -> &HwStrategy {
        &self.strategy
    }

    pub fn pool(&self) -> Option<&LutBufferPool> {
        self.pool.as_ref()
    }

    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.pool.as_ref().map(|p| p.stats())
    }

    /// Bank the next LUT will be written for
    pub fn bank(&self) -> LutBank {
        self.state.bank
    }

    pub fn is_enabled(&self) -> bool {
        self.state.tracker.is_enabled()
    }

    pub fn current_lut(&self) -> Option<CommittedLut> {
        self.state.current_lut
    }

    pub fn state(&self) -> &BlockRuntimeState {
        &self.state
    }
}
