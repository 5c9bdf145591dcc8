//! Simulated collaborators for running the pipeline without hardware
//!
//! This module provides in-process implementations of every collaborator
//! trait so the pipeline can be exercised by the simulator binary, the
//! integration tests and the benchmarks.
//!
//! # Components
//!
//! - [`InMemoryTuningStore`] - Calibration records keyed by block and selector
//! - [`SimInterpolator`] - Scales calibration coefficients by gain and CCT
//! - [`SimCalculator`] - Deterministic LUT and register generation
//! - [`SimEncoder`] - Fixed-length command payloads
//! - [`RecordingMetadataSink`] - Records every property and debug tag
//!
//! All of them support failure injection so error paths can be driven from
//! tests.
//!
//! # Example
//!
//! ```ignore
//! use bps_iq::backend::mock_hw::*;
//!
//! let store = InMemoryTuningStore::with_defaults();
//! let calculator = SimCalculator::new();
//! calculator.fail_block(BlockType::Abf);
//! ```

use crate::backend::calc::{
    CalcInput, CalcOutput, FirmwareData, InterpolatedState, Interpolator, IqCalculator,
};
use crate::backend::encoder::{HwEncoder, RegisterValues};
use crate::backend::metadata::{MetadataError, MetadataSink};
use crate::backend::tuning::{
    CalibrationId, CalibrationRecord, CalibrationRef, FeatureConfig, HysteresisDirection,
    HysteresisTrigger, TuningSelector, TuningStore,
};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::RequestId;
use crate::registry::TagId;
use crate::types::{BlockType, ChipRevision, ControlVariable, Roi};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Command payload length of every simulated block, in words
pub const SIM_PAYLOAD_WORDS: usize = 12;

/// Registers produced by the simulated calculator
const SIM_REGISTER_WORDS: usize = 8;

// ============================================================================
// Tuning store
// ============================================================================

/// Tuning store backed by a map
///
/// Lookups fall back to the default selector when the exact selector has no
/// record, the way a tuning binary falls back to its default mode.
pub struct InMemoryTuningStore {
    records: Mutex<HashMap<(BlockType, TuningSelector), CalibrationRef>>,
    valid: AtomicBool,
    next_id: AtomicU64,
    resolve_calls: AtomicUsize,
}

impl InMemoryTuningStore {
    /// Empty store
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            valid: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
            resolve_calls: AtomicUsize::new(0),
        }
    }

    /// Store with an enabled record for every block under the default selector
    pub fn with_defaults() -> Self {
        let store = Self::new();
        for &block in BlockType::all() {
            store.insert(block, TuningSelector::default(), default_record(block));
        }
        store
    }

    /// Insert a record, returning its new identity
    pub fn insert(
        &self,
        block: BlockType,
        selector: TuningSelector,
        record: CalibrationRecord,
    ) -> CalibrationId {
        let id = CalibrationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut records) = self.records.lock() {
            records.insert((block, selector), CalibrationRef::new(id, record));
        }
        id
    }

    /// Remove a record
    pub fn remove(&self, block: BlockType, selector: &TuningSelector) {
        if let Ok(mut records) = self.records.lock() {
            records.remove(&(block, *selector));
        }
    }

    pub fn set_valid(&self, valid: bool) {
        self.valid.store(valid, Ordering::Relaxed);
    }

    /// Number of `resolve_calibration` calls so far
    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::Relaxed)
    }
}

impl Default for InMemoryTuningStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TuningStore for InMemoryTuningStore {
    fn is_selector_valid(&self) -> bool {
        self.valid.load(Ordering::Relaxed)
    }

    fn resolve_calibration(
        &self,
        block: BlockType,
        selector: &TuningSelector,
    ) -> Option<CalibrationRef> {
        self.resolve_calls.fetch_add(1, Ordering::Relaxed);
        let records = self.records.lock().ok()?;
        records
            .get(&(block, *selector))
            .or_else(|| records.get(&(block, TuningSelector::default())))
            .cloned()
    }
}

/// Default calibration record for a block
pub fn default_record(block: BlockType) -> CalibrationRecord {
    let features = match block {
        BlockType::Abf => vec![
            FeatureConfig::fixed("bilateral", true),
            FeatureConfig::fixed("minmax", true),
            FeatureConfig::dynamic(
                "directional_smoothing",
                HysteresisTrigger {
                    control: ControlVariable::Gain,
                    direction: HysteresisDirection::Upward,
                    start: 2.0,
                    end: 4.0,
                },
            ),
        ],
        BlockType::Hnr => vec![
            FeatureConfig::fixed("lnr", true),
            FeatureConfig::dynamic(
                "snr",
                HysteresisTrigger {
                    control: ControlVariable::LuxIndex,
                    direction: HysteresisDirection::Downward,
                    start: 200.0,
                    end: 300.0,
                },
            ),
        ],
        _ => Vec::new(),
    };
    let base = block.index() as f32 + 1.0;
    CalibrationRecord {
        block,
        enable: true,
        symbol_table_id: 1,
        features,
        coefficients: vec![base, base * 0.5, base * 0.25, base * 0.125],
    }
}

// ============================================================================
// Interpolator
// ============================================================================

/// Interpolator that scales coefficients by gain and color temperature
#[derive(Debug, Default)]
pub struct SimInterpolator;

impl Interpolator for SimInterpolator {
    fn try_update(
        &self,
        _block: BlockType,
        trigger: &crate::types::TriggerSnapshot,
        calibration: &CalibrationRef,
        state: &mut InterpolatedState,
    ) -> bool {
        let scale = trigger.aec_gain.max(1.0).ln() + trigger.color_temperature / 5000.0;
        let coefficients: Vec<f32> = calibration
            .record
            .coefficients
            .iter()
            .map(|c| c * scale)
            .collect();

        if coefficients == state.coefficients {
            return false;
        }
        state.coefficients = coefficients;
        state.generation += 1;
        true
    }
}

// ============================================================================
// Calculator
// ============================================================================

/// Deterministic calculator with per-block failure and panic injection
pub struct SimCalculator {
    failing: Mutex<HashSet<BlockType>>,
    panicking: Mutex<HashSet<BlockType>>,
    calls: AtomicUsize,
}

impl SimCalculator {
    pub fn new() -> Self {
        Self {
            failing: Mutex::new(HashSet::new()),
            panicking: Mutex::new(HashSet::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Make every calculation for `block` panic
    pub fn panic_block(&self, block: BlockType) {
        if let Ok(mut panicking) = self.panicking.lock() {
            panicking.insert(block);
        }
    }

    /// Make every calculation for `block` fail
    pub fn fail_block(&self, block: BlockType) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(block);
        }
    }

    /// Lift every injected failure and panic
    pub fn clear_failures(&self) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.clear();
        }
        if let Ok(mut panicking) = self.panicking.lock() {
            panicking.clear();
        }
    }

    /// Number of `calculate` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn is_failing(&self, block: BlockType) -> bool {
        self.failing
            .lock()
            .map(|f| f.contains(&block))
            .unwrap_or(false)
    }
}

impl Default for SimCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl IqCalculator for SimCalculator {
    fn calculate(&self, input: &CalcInput<'_>, lut: &mut [u32]) -> PipelineResult<CalcOutput> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let panicking = self
            .panicking
            .lock()
            .map(|p| p.contains(&input.block))
            .unwrap_or(false);
        if panicking {
            panic!("{}: injected panic", input.block);
        }
        if self.is_failing(input.block) {
            return Err(PipelineError::Calculation {
                block: input.block,
                message: "injected failure".into(),
            });
        }

        let seed = input
            .interpolated
            .coefficients
            .iter()
            .fold(0u32, |acc, c| acc.rotate_left(5) ^ c.to_bits());
        let bank_bit = input.bank.index() << 31;
        for (i, word) in lut.iter_mut().enumerate() {
            *word = (seed.wrapping_add(i as u32) & 0x7FFF_FFFF) | bank_bit;
        }

        let mut features = 0u32;
        for (i, on) in input.feature_enables.iter().enumerate() {
            if *on {
                features |= 1 << i;
            }
        }
        let mut registers = vec![0u32; SIM_REGISTER_WORDS];
        registers[0] = features;
        registers[1] = input.bank.index();
        registers[2] = lut.len() as u32;
        registers[3] = seed;
        registers[4] = input.trigger.aec_gain.to_bits();
        registers[5] = input.trigger.color_temperature.to_bits();
        registers[6] = input.revision.raw();
        registers[7] = input.block.index() as u32;

        let region = input
            .block
            .is_stats()
            .then(|| Roi::new(0, 0, 4000, 3000));

        Ok(CalcOutput {
            registers,
            firmware: FirmwareData {
                coefficients: input.interpolated.coefficients.clone(),
                gains: vec![input.trigger.aec_gain, input.trigger.drc_gain],
                region,
            },
        })
    }
}

// ============================================================================
// Encoder
// ============================================================================

/// Encoder writing a fixed-length payload: header, LUT reference, registers
pub struct SimEncoder {
    failing: Mutex<HashSet<BlockType>>,
    encodes: AtomicUsize,
    dumps: AtomicUsize,
}

impl SimEncoder {
    pub fn new() -> Self {
        Self {
            failing: Mutex::new(HashSet::new()),
            encodes: AtomicUsize::new(0),
            dumps: AtomicUsize::new(0),
        }
    }

    pub fn fail_block(&self, block: BlockType) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(block);
        }
    }

    /// Number of successful `encode` calls so far
    pub fn encodes(&self) -> usize {
        self.encodes.load(Ordering::Relaxed)
    }

    /// Number of register dumps rendered so far
    pub fn dumps(&self) -> usize {
        self.dumps.load(Ordering::Relaxed)
    }
}

impl Default for SimEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HwEncoder for SimEncoder {
    fn payload_length(&self, _block: BlockType, _revision: ChipRevision) -> usize {
        SIM_PAYLOAD_WORDS
    }

    fn encode(&self, values: &RegisterValues<'_>, dest: &mut [u32]) -> PipelineResult<()> {
        let failing = self
            .failing
            .lock()
            .map(|f| f.contains(&values.block))
            .unwrap_or(false);
        if failing {
            return Err(PipelineError::Encode {
                block: values.block,
                message: "injected failure".into(),
            });
        }
        if dest.len() < 2 + values.registers.len() {
            return Err(PipelineError::Encode {
                block: values.block,
                message: format!(
                    "{} registers do not fit a {} word payload",
                    values.registers.len(),
                    dest.len()
                ),
            });
        }

        dest.fill(0);
        dest[0] = ((values.block.index() as u32) << 16)
            | (values.bank.index() << 1)
            | values.enable as u32;
        dest[1] = values.lut.map(|id| id.0).unwrap_or(u32::MAX);
        dest[2..2 + values.registers.len()].copy_from_slice(values.registers);
        self.encodes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn dump_debug_view(&self, block: BlockType, registers: &[u32]) -> String {
        self.dumps.fetch_add(1, Ordering::Relaxed);
        let words: Vec<String> = registers.iter().map(|r| format!("0x{:08X}", r)).collect();
        format!("{} registers [{}]", block, words.join(", "))
    }
}

// ============================================================================
// Metadata sink
// ============================================================================

/// One recorded debug tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugTagRecord {
    pub request: RequestId,
    pub tag_id: u32,
    pub type_id: u32,
    pub count: usize,
    pub bytes: Vec<u8>,
}

/// Metadata sink that keeps everything it is given
#[derive(Default)]
pub struct RecordingMetadataSink {
    properties: Mutex<Vec<(RequestId, TagId, Vec<u8>)>>,
    debug_tags: Mutex<Vec<DebugTagRecord>>,
    reject_properties: AtomicBool,
    reject_debug: AtomicBool,
}

impl RecordingMetadataSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reject_properties(&self, reject: bool) {
        self.reject_properties.store(reject, Ordering::Relaxed);
    }

    pub fn set_reject_debug(&self, reject: bool) {
        self.reject_debug.store(reject, Ordering::Relaxed);
    }

    pub fn properties(&self) -> Vec<(RequestId, TagId, Vec<u8>)> {
        self.properties
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn properties_for(&self, request: RequestId) -> Vec<(TagId, Vec<u8>)> {
        self.properties()
            .into_iter()
            .filter(|(r, _, _)| *r == request)
            .map(|(_, tag, bytes)| (tag, bytes))
            .collect()
    }

    pub fn debug_tags(&self) -> Vec<DebugTagRecord> {
        self.debug_tags
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

impl MetadataSink for RecordingMetadataSink {
    fn write_property(
        &self,
        request: RequestId,
        tag: TagId,
        bytes: &[u8],
    ) -> Result<(), MetadataError> {
        if self.reject_properties.load(Ordering::Relaxed) {
            return Err(MetadataError(format!("property {:?} rejected", tag)));
        }
        self.properties
            .lock()
            .map_err(|_| MetadataError("property log poisoned".into()))?
            .push((request, tag, bytes.to_vec()));
        Ok(())
    }

    fn add_debug_tag(
        &self,
        request: RequestId,
        tag_id: u32,
        type_id: u32,
        count: usize,
        bytes: &[u8],
    ) -> Result<(), MetadataError> {
        if self.reject_debug.load(Ordering::Relaxed) {
            return Err(MetadataError(format!("debug tag 0x{:08X} rejected", tag_id)));
        }
        self.debug_tags
            .lock()
            .map_err(|_| MetadataError("debug log poisoned".into()))?
            .push(DebugTagRecord {
                request,
                tag_id,
                type_id,
                count,
                bytes: bytes.to_vec(),
            });
        Ok(())
    }
}
