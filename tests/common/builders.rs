//! Test data builders for configs and requests

use bps_iq::config::{ModuleOverride, PipelineConfig};
use bps_iq::pipeline::{FrameRequest, RequestId};
use bps_iq::types::{BlockType, ChipRevision, FrameControls, TriggerSnapshot};

/// Builder for pipeline configs
pub struct ConfigBuilder {
    config: PipelineConfig,
}

impl ConfigBuilder {
    pub fn new(revision: ChipRevision) -> Self {
        Self {
            config: PipelineConfig {
                revision: revision.raw(),
                ..Default::default()
            },
        }
    }

    pub fn depth(mut self, depth: usize) -> Self {
        self.config.request_queue_depth = depth;
        self
    }

    pub fn parallel(mut self) -> Self {
        self.config.parallel_blocks = true;
        self
    }

    /// Keep only the listed blocks in the plan
    pub fn only(mut self, blocks: &[BlockType]) -> Self {
        let table = bps_iq::PipelineAssembler::table(
            ChipRevision::from_raw(self.config.revision).unwrap_or(ChipRevision::Titan480),
        );
        self.config.module_overrides = table
            .iter()
            .filter(|d| !blocks.contains(&d.block) && d.installed)
            .map(|d| ModuleOverride {
                block: d.block,
                enable: false,
            })
            .collect();
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

/// Builder for frame requests
pub struct RequestBuilder {
    request: FrameRequest,
}

impl RequestBuilder {
    pub fn new(id: u64) -> Self {
        Self {
            request: FrameRequest::new(RequestId(id)),
        }
    }

    pub fn gain(mut self, gain: f32) -> Self {
        self.request.trigger.aec_gain = gain;
        self
    }

    pub fn lux(mut self, lux: f32) -> Self {
        self.request.trigger.lux_index = lux;
        self
    }

    pub fn trigger(mut self, trigger: TriggerSnapshot) -> Self {
        self.request.trigger = trigger;
        self
    }

    pub fn controls(mut self, controls: FrameControls) -> Self {
        self.request.controls = controls;
        self
    }

    pub fn manual(mut self, block: BlockType, enable: bool) -> Self {
        self.request = self.request.with_manual(block, enable);
        self
    }

    pub fn capture(mut self) -> Self {
        self.request.tuning_capture = true;
        self
    }

    pub fn build(self) -> FrameRequest {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_disables_everything_else() {
        let config = ConfigBuilder::new(ChipRevision::Titan170)
            .only(&[BlockType::Abf])
            .build();
        assert_eq!(config.module_overrides.len(), 17);
        assert!(config.module_overrides.iter().all(|o| !o.enable));
    }
}
