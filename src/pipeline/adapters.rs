//! Typed accessors over the tuning store and the tag registry.

use crate::backend::tuning::{CalibrationRef, TuningSelector, TuningStore};
use crate::error::{BpsError, Result};
use crate::registry::{TagId, TagRegistry};
use crate::types::BlockType;

/// Outcome of a calibration lookup for one frame
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Selector unchanged since the last successful lookup, store not queried
    NotRequested,
    Resolved(CalibrationRef),
    /// Store has no record for this selector
    NotFound,
    /// Store reported its data invalid; lookup retried next frame
    StoreInvalid,
}

/// Resolves a block's calibration, querying the store only when the selector
/// changes.
#[derive(Debug, Clone)]
pub struct CalibrationResolver {
    block: BlockType,
    last_selector: Option<TuningSelector>,
}

impl CalibrationResolver {
    pub fn new(block: BlockType) -> Self {
        Self {
            block,
            last_selector: None,
        }
    }

    pub fn resolve(&mut self, store: &dyn TuningStore, selector: &TuningSelector) -> Resolution {
        if self.last_selector.as_ref() == Some(selector) {
            return Resolution::NotRequested;
        }
        if !store.is_selector_valid() {
            tracing::warn!("{}: tuning store invalid, calibration not resolved", self.block);
            return Resolution::StoreInvalid;
        }

        self.last_selector = Some(*selector);
        match store.resolve_calibration(self.block, selector) {
            Some(calibration) => Resolution::Resolved(calibration),
            None => {
                tracing::warn!("{}: no calibration for {:?}", self.block, selector);
                Resolution::NotFound
            }
        }
    }

    /// Force the next `resolve` to query the store
    pub fn invalidate(&mut self) {
        self.last_selector = None;
    }
}

/// Property tag ids a block writes every frame, resolved once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockTags {
    pub firmware: TagId,
    pub enable: TagId,
    pub roi: TagId,
}

impl BlockTags {
    pub fn resolve(registry: &TagRegistry, block: BlockType) -> Result<Self> {
        let section = TagRegistry::block_section_name(block);
        let lookup = |tag: &str| {
            registry.resolve(&section, tag).ok_or_else(|| {
                BpsError::Config(format!("tag {}.{} is not registered", section, tag))
            })
        };
        Ok(Self {
            firmware: lookup("firmware")?,
            enable: lookup("enable")?,
            roi: lookup("roi")?,
        })
    }
}
