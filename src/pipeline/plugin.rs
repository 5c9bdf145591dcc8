//! Statistics plugins.
//!
//! Optional vendor statistics algorithms register a factory under a name in a
//! [`PluginRegistry`] at startup. The pipeline resolves the names listed in
//! its config once, and every successfully processed frame's metadata record
//! is offered to each resolved plugin.

use crate::error::{BpsError, Result};
use crate::pipeline::frame::FrameMetadataRecord;
use crate::registry::ModulePlan;
use crate::types::BlockType;
use std::collections::BTreeMap;

/// A statistics consumer fed with per-frame metadata
pub trait StatsPlugin: Send {
    /// Human-readable name of this plugin.
    fn name(&self) -> &str;

    /// Called once when the pipeline is built.
    fn on_activate(&mut self, _plan: &ModulePlan) {}

    /// Called for every successfully processed frame.
    fn on_frame(&mut self, record: &FrameMetadataRecord);

    /// Called when the pipeline is dropped.
    fn on_deactivate(&mut self) {}
}

pub type PluginFactory = Box<dyn Fn() -> Box<dyn StatsPlugin> + Send + Sync>;

/// Registration table of plugin factories
#[derive(Default)]
pub struct PluginRegistry {
    factories: BTreeMap<String, PluginFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the plugins shipped in this crate
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.factories.insert(
            BlockActivityPlugin::NAME.to_string(),
            Box::new(|| -> Box<dyn StatsPlugin> { Box::new(BlockActivityPlugin::default()) }),
        );
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn() -> Box<dyn StatsPlugin> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(BpsError::Config(format!(
                "stats plugin '{}' registered twice",
                name
            )));
        }
        self.factories.insert(name, Box::new(factory));
        Ok(())
    }

    /// Instantiate the named plugins. Unknown names are logged and skipped.
    pub fn resolve(&self, names: &[String]) -> Vec<Box<dyn StatsPlugin>> {
        names
            .iter()
            .filter_map(|name| match self.factories.get(name) {
                Some(factory) => {
                    tracing::info!("Loaded stats plugin {}", name);
                    Some(factory())
                }
                None => {
                    tracing::warn!("Stats plugin {} is not registered, skipping", name);
                    None
                }
            })
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(|k| k.as_str())
    }
}

/// Counts enabled and adjusted frames per block
#[derive(Debug, Default)]
pub struct BlockActivityPlugin {
    frames: u64,
    enabled: BTreeMap<BlockType, u64>,
    adjusted: BTreeMap<BlockType, u64>,
}

impl BlockActivityPlugin {
    pub const NAME: &'static str = "block_activity";

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn enabled_frames(&self, block: BlockType) -> u64 {
        self.enabled.get(&block).copied().unwrap_or(0)
    }

    pub fn adjusted_frames(&self, block: BlockType) -> u64 {
        self.adjusted.get(&block).copied().unwrap_or(0)
    }
}

impl StatsPlugin for BlockActivityPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn on_frame(&mut self, record: &FrameMetadataRecord) {
        self.frames += 1;
        for entry in &record.blocks {
            if entry.enabled {
                *self.enabled.entry(entry.block).or_default() += 1;
            }
            if entry.adjusted {
                *self.adjusted.entry(entry.block).or_default() += 1;
            }
        }
    }

    fn on_deactivate(&mut self) {
        for (block, count) in &self.adjusted {
            tracing::info!(
                "{}: adjusted in {} of {} frames",
                block,
                count,
                self.frames
            );
        }
    }
}
