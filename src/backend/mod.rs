//! Collaborator interfaces the pipeline drives
//!
//! Everything the per-block protocol needs from the outside world is expressed
//! as a trait here. Implementations must be `Send + Sync` so blocks of one
//! frame can run on worker threads.
//!
//! # Components
//!
//! - [`TuningStore`] - Resolves calibration records for a tuning selector
//! - [`Interpolator`] - Re-interpolates coefficients for a trigger snapshot
//! - [`IqCalculator`] - Numeric calculation of registers and LUT words
//! - [`HwEncoder`] - Command payload encoding
//! - [`MetadataSink`] - Per-frame properties and debug tags
//! - [`mock_hw`] - Simulated implementations of all of the above

pub mod calc;
pub mod encoder;
pub mod metadata;
pub mod mock_hw;
pub mod tuning;

pub use calc::{CalcInput, CalcOutput, FirmwareData, InterpolatedState, Interpolator, IqCalculator};
pub use encoder::{HwEncoder, RegisterValues};
pub use metadata::{MetadataError, MetadataSink};
pub use tuning::{
    CalibrationId, CalibrationRecord, CalibrationRef, FeatureConfig, HysteresisDirection,
    HysteresisTrigger, TuningSelector, TuningStore,
};
