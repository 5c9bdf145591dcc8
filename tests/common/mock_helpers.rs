//! Collaborator construction helpers

use bps_iq::backend::mock_hw::{
    InMemoryTuningStore, RecordingMetadataSink, SimCalculator, SimEncoder, SimInterpolator,
};
use bps_iq::config::PipelineConfig;
use bps_iq::pipeline::{BpsPipeline, Collaborators, PipelineBuilder};
use std::sync::Arc;

/// Simulated collaborators with handles kept for inspection
pub struct SimHarness {
    pub store: Arc<InMemoryTuningStore>,
    pub calculator: Arc<SimCalculator>,
    pub encoder: Arc<SimEncoder>,
    pub sink: Arc<RecordingMetadataSink>,
}

impl SimHarness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryTuningStore::with_defaults()),
            calculator: Arc::new(SimCalculator::new()),
            encoder: Arc::new(SimEncoder::new()),
            sink: Arc::new(RecordingMetadataSink::new()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            tuning: self.store.clone(),
            interpolator: Arc::new(SimInterpolator),
            calculator: self.calculator.clone(),
            encoder: self.encoder.clone(),
            metadata: self.sink.clone(),
        }
    }

    pub fn pipeline(&self, config: PipelineConfig) -> BpsPipeline {
        PipelineBuilder::new(config)
            .build(self.collaborators())
            .expect("pipeline should build")
    }
}

impl Default for SimHarness {
    fn default() -> Self {
        Self::new()
    }
}
