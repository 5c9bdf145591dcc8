//! Tuning store interface
//!
//! The tuning store resolves an opaque selector (sensor mode, use case, scene,
//! effect, ...) to the calibration record for one block. The pipeline only
//! compares the identity of the returned reference between frames; the
//! record contents are consumed by the interpolator and calculator.
//!
//! # Main Types
//!
//! - [`TuningSelector`] - Key derived from capture mode/scene/feature state
//! - [`CalibrationRecord`] - Static enable, feature enables and coefficients
//! - [`CalibrationRef`] - Shared handle with identity comparison
//! - [`TuningStore`] - The store contract

use crate::types::{BlockType, ControlVariable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Selector the tuning store resolves calibration records for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TuningSelector {
    pub sensor_mode: u16,
    pub usecase: u16,
    pub feature1: u16,
    pub feature2: u16,
    pub scene: u16,
    pub effect: u16,
}

/// Stable identity of a calibration record inside the store
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CalibrationId(pub u64);

impl fmt::Debug for CalibrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Calibration(0x{:X})", self.0)
    }
}

/// Direction a hysteresis trigger turns a feature on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HysteresisDirection {
    /// On once the trigger rises to `end`, off once it falls below `start`
    Upward,
    /// On once the trigger falls to `start`, off once it rises above `end`
    Downward,
}

/// Dynamic enable rule for one feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HysteresisTrigger {
    pub control: ControlVariable,
    pub direction: HysteresisDirection,
    pub start: f32,
    pub end: f32,
}

/// Sub-feature of a block that calibration can toggle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub name: String,
    /// Static enable
    pub enable: bool,
    /// Optional dynamic enable; replaces the static enable once evaluated
    pub dynamic_enable: Option<HysteresisTrigger>,
}

impl FeatureConfig {
    pub fn fixed(name: impl Into<String>, enable: bool) -> Self {
        Self {
            name: name.into(),
            enable,
            dynamic_enable: None,
        }
    }

    pub fn dynamic(name: impl Into<String>, trigger: HysteresisTrigger) -> Self {
        Self {
            name: name.into(),
            enable: false,
            dynamic_enable: Some(trigger),
        }
    }
}

/// Calibration data for one block under one selector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub block: BlockType,
    /// Static module enable bit
    pub enable: bool,
    /// Symbol table the record was compiled against; part of its identity
    pub symbol_table_id: u32,
    pub features: Vec<FeatureConfig>,
    pub coefficients: Vec<f32>,
}

/// Shared reference to a resolved calibration record
#[derive(Debug, Clone)]
pub struct CalibrationRef {
    pub id: CalibrationId,
    pub record: Arc<CalibrationRecord>,
}

impl CalibrationRef {
    pub fn new(id: CalibrationId, record: CalibrationRecord) -> Self {
        Self {
            id,
            record: Arc::new(record),
        }
    }

    /// Identity comparison; contents are never compared
    pub fn same_identity(&self, other: &CalibrationRef) -> bool {
        self.id == other.id && self.record.symbol_table_id == other.record.symbol_table_id
    }
}

/// Tuning data store contract
#[cfg_attr(test, mockall::automock)]
pub trait TuningStore: Send + Sync {
    /// Whether the store has valid data for the current session
    fn is_selector_valid(&self) -> bool;

    /// Resolve the calibration record for a block. `None` when the store has no
    /// record for this selector.
    fn resolve_calibration(
        &self,
        block: BlockType,
        selector: &TuningSelector,
    ) -> Option<CalibrationRef>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(symbol_table_id: u32) -> CalibrationRecord {
        CalibrationRecord {
            block: BlockType::Abf,
            enable: true,
            symbol_table_id,
            features: vec![FeatureConfig::fixed("bilateral", true)],
            coefficients: vec![1.0, 2.0],
        }
    }

    #[test]
    fn test_identity_ignores_contents() {
        let a = CalibrationRef::new(CalibrationId(1), record(7));
        let mut other = record(7);
        other.coefficients = vec![9.0];
        let b = CalibrationRef::new(CalibrationId(1), other);
        assert!(a.same_identity(&b));

        let c = CalibrationRef::new(CalibrationId(1), record(8));
        assert!(!a.same_identity(&c));
        let d = CalibrationRef::new(CalibrationId(2), record(7));
        assert!(!a.same_identity(&d));
    }
}
