//! Per-request orchestration of the assembled block list.
//!
//! For each request the pipeline:
//! 1. Drains hardware completions, releasing buffers of finished requests.
//! 2. Runs every block's protocol, in order or on scoped worker threads.
//! 3. Fails the whole request if any block failed fatally. Remaining blocks
//!    still run so their buffers are recycled.
//! 4. Otherwise records the committed LUTs as in flight, builds the command
//!    list and metadata record, and feeds the stats plugins.

use crate::backend::{HwEncoder, Interpolator, IqCalculator, MetadataSink, TuningStore};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pipeline::block::{BlockReport, BlockServices, IqBlock};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::frame::{CommandList, FrameMetadataRecord, FrameOutcome, FrameRequest};
use crate::pipeline::id::{BlockId, RequestId};
use crate::pipeline::lut_pool::PoolStats;
use crate::pipeline::plugin::{PluginRegistry, StatsPlugin};
use crate::registry::{AssemblyOptions, ModulePlan, PipelineAssembler, TagRegistry};
use crate::types::BlockType;
use crossbeam_channel::{Receiver, Sender};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Shared collaborator implementations
#[derive(Clone)]
pub struct Collaborators {
    pub tuning: Arc<dyn TuningStore>,
    pub interpolator: Arc<dyn Interpolator>,
    pub calculator: Arc<dyn IqCalculator>,
    pub encoder: Arc<dyn HwEncoder>,
    pub metadata: Arc<dyn MetadataSink>,
}

impl Collaborators {
    fn services(&self) -> BlockServices<'_> {
        BlockServices {
            tuning: self.tuning.as_ref(),
            interpolator: self.interpolator.as_ref(),
            calculator: self.calculator.as_ref(),
            encoder: self.encoder.as_ref(),
            metadata: self.metadata.as_ref(),
        }
    }
}

/// State of a submitted request awaiting hardware completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InFlightState {
    Submitted,
    /// Cancelled upstream; buffers are still held until the hardware is done
    Aborted,
}

/// Pipeline counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub requests: u64,
    pub failed_requests: u64,
    pub acknowledged: u64,
    pub aborted: u64,
    /// Block recomputations across all requests
    pub recomputations: u64,
    pub capture_warnings: u64,
    /// Duration of the most recent request in microseconds
    pub last_request_us: u64,
    pub peak_in_flight: usize,
}

pub struct BpsPipeline {
    plan: ModulePlan,
    blocks: Vec<IqBlock>,
    collaborators: Collaborators,
    plugins: Vec<Box<dyn StatsPlugin>>,
    completion_tx: Sender<RequestId>,
    completion_rx: Receiver<RequestId>,
    in_flight: BTreeMap<RequestId, InFlightState>,
    config: PipelineConfig,
    stats: PipelineStats,
    next_request: RequestId,
}

impl BpsPipeline {
    /// Process one request through every block in the plan
    pub fn process_request(&mut self, request: &FrameRequest) -> PipelineResult<FrameOutcome> {
        let start = Instant::now();
        self.drain_completions();

        let request_id = request.request_id;
        self.stats.requests += 1;
        if self.in_flight.len() >= self.config.request_queue_depth {
            tracing::warn!(
                "{}: {} requests already in flight (queue depth {})",
                request_id,
                self.in_flight.len(),
                self.config.request_queue_depth
            );
        }

        let request = self.apply_debug_settings(request);
        let results = self.run_blocks(&request);

        let mut reports = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        // Non-fatal capture failures travel inside the report, so every
        // error here fails the request.
        for (block, result) in results {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => failures.push((block, e.to_string())),
            }
        }

        self.stats.last_request_us = start.elapsed().as_micros() as u64;

        if !failures.is_empty() {
            self.stats.failed_requests += 1;
            tracing::error!(
                "{} failed in {} block(s), nothing submitted",
                request_id,
                failures.len()
            );
            return Err(PipelineError::FrameFailed {
                request: request_id,
                failures,
            });
        }

        let outcome = self.finish_request(request_id, reports)?;
        for plugin in &mut self.plugins {
            plugin.on_frame(&outcome.metadata);
        }
        Ok(outcome)
    }

    fn apply_debug_settings<'r>(&self, request: &'r FrameRequest) -> Cow<'r, FrameRequest> {
        let debug = &self.config.debug;
        if !debug.tuning_capture && debug.dump_reg_config.is_empty() {
            return Cow::Borrowed(request);
        }
        let mut merged = request.clone();
        merged.tuning_capture |= debug.tuning_capture;
        merged
            .dump_reg_config
            .extend(debug.dump_reg_config.iter().copied());
        Cow::Owned(merged)
    }

    fn run_blocks(
        &mut self,
        request: &FrameRequest,
    ) -> Vec<(BlockType, PipelineResult<BlockReport>)> {
        let services = self.collaborators.services();

        if !self.config.parallel_blocks {
            return self
                .blocks
                .iter_mut()
                .map(|block| (block.block(), block.execute(request, &services)))
                .collect();
        }

        std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .blocks
                .iter_mut()
                .map(|block| {
                    let ty = block.block();
                    let services = &services;
                    (ty, scope.spawn(move || block.execute(request, services)))
                })
                .collect();

            handles
                .into_iter()
                .map(|(ty, handle)| {
                    let result = handle.join().unwrap_or_else(|_| {
                        tracing::error!("{}: worker thread panicked", ty);
                        Err(PipelineError::WorkerPanicked { block: ty })
                    });
                    (ty, result)
                })
                .collect()
        })
    }

    fn finish_request(
        &mut self,
        request_id: RequestId,
        reports: Vec<BlockReport>,
    ) -> PipelineResult<FrameOutcome> {
        let mut commands = CommandList {
            request_id,
            entries: Vec::with_capacity(reports.len()),
        };
        let mut metadata = FrameMetadataRecord {
            request_id,
            revision: self.plan.revision,
            blocks: Vec::with_capacity(reports.len()),
        };
        let mut recomputed = Vec::new();
        let mut capture_warnings = Vec::new();

        for report in reports {
            if report.recomputed {
                recomputed.push(report.block);
            }
            if let Some(e) = report.capture_error {
                capture_warnings.push((report.block, e.to_string()));
            }
            if let Some(entry) = report.command {
                if let Some(lut) = &entry.lut {
                    if let Some(block) = self.blocks.iter_mut().find(|b| b.block() == entry.block) {
                        block.mark_submitted(request_id, lut)?;
                    }
                }
                commands.entries.push(entry);
            }
            metadata.blocks.push(report.metadata);
        }

        self.in_flight.insert(request_id, InFlightState::Submitted);
        self.stats.peak_in_flight = self.stats.peak_in_flight.max(self.in_flight.len());
        self.stats.recomputations += recomputed.len() as u64;
        self.stats.capture_warnings += capture_warnings.len() as u64;

        tracing::debug!(
            "{}: {} commands ({} words), {} recomputed",
            request_id,
            commands.len(),
            commands.payload_words(),
            recomputed.len()
        );

        Ok(FrameOutcome {
            commands,
            metadata,
            recomputed,
            capture_warnings,
        })
    }

    /// Hardware finished `request`. Returns the number of buffers freed.
    pub fn acknowledge(&mut self, request: RequestId) -> usize {
        let state = self.in_flight.remove(&request);
        if state.is_none() {
            tracing::warn!("{}: acknowledged but not in flight", request);
            return 0;
        }
        self.stats.acknowledged += 1;

        let freed: usize = self
            .blocks
            .iter_mut()
            .map(|b| b.release_request(request))
            .sum();
        tracing::trace!("{}: acknowledged ({:?}), {} buffers freed", request, state, freed);
        freed
    }

    /// Mark a request cancelled upstream.
    ///
    /// Its buffers stay referenced until the hardware completion arrives.
    /// Returns false if the request is not in flight.
    pub fn abort(&mut self, request: RequestId) -> bool {
        match self.in_flight.get_mut(&request) {
            Some(state @ InFlightState::Submitted) => {
                *state = InFlightState::Aborted;
                self.stats.aborted += 1;
                tracing::info!("{}: aborted, waiting for hardware completion", request);
                true
            }
            Some(InFlightState::Aborted) => true,
            None => false,
        }
    }

    /// Process every completion queued on the channel. Returns the number of
    /// requests acknowledged.
    pub fn drain_completions(&mut self) -> usize {
        let mut count = 0;
        while let Ok(request) = self.completion_rx.try_recv() {
            self.acknowledge(request);
            count += 1;
        }
        count
    }

    /// Sender half of the hardware completion queue
    pub fn completion_sender(&self) -> Sender<RequestId> {
        self.completion_tx.clone()
    }

    /// Allocate the next request id
    pub fn next_request_id(&mut self) -> RequestId {
        self.next_request = self.next_request.next();
        self.next_request
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn in_flight_state(&self, request: RequestId) -> Option<InFlightState> {
        self.in_flight.get(&request).copied()
    }

    pub fn block(&self, block: BlockType) -> Option<&IqBlock> {
        self.blocks.iter().find(|b| b.block() == block)
    }

    pub fn blocks(&self) -> &[IqBlock] {
        &self.blocks
    }

    pub fn plan(&self) -> &ModulePlan {
        &self.plan
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Pool statistics of every block that owns a LUT pool
    pub fn pool_summary(&self) -> Vec<(BlockType, PoolStats)> {
        self.blocks
            .iter()
            .filter_map(|b| b.pool_stats().map(|s| (b.block(), s)))
            .collect()
    }
}

impl Drop for BpsPipeline {
    fn drop(&mut self) {
        for plugin in &mut self.plugins {
            plugin.on_deactivate();
        }
        if !self.in_flight.is_empty() {
            tracing::warn!(
                "Pipeline dropped with {} requests in flight",
                self.in_flight.len()
            );
        }
    }
}

/// Builds a [`BpsPipeline`] from a config
pub struct PipelineBuilder {
    config: PipelineConfig,
    tags: Option<TagRegistry>,
    plugins: PluginRegistry,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            tags: None,
            plugins: PluginRegistry::with_builtin(),
        }
    }

    /// Use an existing tag registry instead of the standard block sections
    pub fn with_tag_registry(mut self, tags: TagRegistry) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn build(self, collaborators: Collaborators) -> Result<BpsPipeline> {
        self.config.validate()?;
        let revision = self.config.chip_revision()?;

        let options = AssemblyOptions {
            sensor_format: self.config.sensor_format,
            overrides: self.config.module_overrides.clone(),
        };
        let plan = PipelineAssembler::assemble(self.config.revision, &options)?;

        let tags = match self.tags {
            Some(tags) => tags,
            None => TagRegistry::with_block_sections()?,
        };

        let blocks = plan
            .blocks
            .iter()
            .enumerate()
            .map(|(i, desc)| {
                IqBlock::new(
                    BlockId(i as u32),
                    desc,
                    revision,
                    self.config.request_queue_depth,
                    &tags,
                    collaborators.encoder.as_ref(),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let mut plugins = self.plugins.resolve(&self.config.stats_plugins);
        for plugin in &mut plugins {
            plugin.on_activate(&plan);
        }

        tracing::info!(
            "BPS pipeline ready: {} with {} blocks, queue depth {}{}",
            revision,
            blocks.len(),
            self.config.request_queue_depth,
            if self.config.parallel_blocks {
                ", parallel"
            } else {
                ""
            }
        );

        let (completion_tx, completion_rx) = crossbeam_channel::unbounded();
        Ok(BpsPipeline {
            plan,
            blocks,
            collaborators,
            plugins,
            completion_tx,
            completion_rx,
            in_flight: BTreeMap::new(),
            config: self.config,
            stats: PipelineStats::default(),
            next_request: RequestId::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::calc::{CalcInput, CalcOutput};
    use crate::backend::mock_hw::{
        InMemoryTuningStore, RecordingMetadataSink, SimCalculator, SimEncoder, SimInterpolator,
    };
    use crate::config::ModuleOverride;
    use crate::error::BpsError;
    use crate::types::TriggerSnapshot;
    use std::sync::Mutex;

    fn collaborators() -> (Collaborators, Arc<RecordingMetadataSink>) {
        let sink = Arc::new(RecordingMetadataSink::new());
        let collab = Collaborators {
            tuning: Arc::new(InMemoryTuningStore::with_defaults()),
            interpolator: Arc::new(SimInterpolator),
            calculator: Arc::new(SimCalculator::new()),
            encoder: Arc::new(SimEncoder::new()),
            metadata: sink.clone(),
        };
        (collab, sink)
    }

    fn pipeline(config: PipelineConfig) -> BpsPipeline {
        PipelineBuilder::new(config)
            .build(collaborators().0)
            .unwrap()
    }

    #[test]
    fn test_build_rejects_unknown_revision() {
        let config = PipelineConfig {
            revision: 0xDEAD,
            ..Default::default()
        };
        let err = PipelineBuilder::new(config)
            .build(collaborators().0)
            .err()
            .unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_commands_follow_plan_order() {
        let mut p = pipeline(PipelineConfig::default());
        let id = p.next_request_id();
        let outcome = p.process_request(&FrameRequest::new(id)).unwrap();

        let order: Vec<BlockType> = outcome.commands.entries.iter().map(|e| e.block).collect();
        let plan: Vec<BlockType> = p
            .plan()
            .block_types()
            .into_iter()
            .filter(|b| outcome.metadata.block(*b).is_some_and(|m| m.enabled))
            .collect();
        assert_eq!(order, plan);
        assert_eq!(p.in_flight_count(), 1);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut seq = pipeline(PipelineConfig::default());
        let mut par = pipeline(PipelineConfig {
            parallel_blocks: true,
            ..Default::default()
        });

        for i in 1..=3u64 {
            let trigger = TriggerSnapshot {
                aec_gain: i as f32,
                ..Default::default()
            };
            let request = FrameRequest::new(RequestId(i)).with_trigger(trigger);
            let a = seq.process_request(&request).unwrap();
            let b = par.process_request(&request).unwrap();
            assert_eq!(a.commands, b.commands);
            assert_eq!(a.metadata, b.metadata);
        }
    }

    #[test]
    fn test_acknowledge_via_channel() {
        let mut p = pipeline(PipelineConfig::default());
        p.process_request(&FrameRequest::new(RequestId(1))).unwrap();
        p.completion_sender().send(RequestId(1)).unwrap();
        assert_eq!(p.drain_completions(), 1);
        assert_eq!(p.in_flight_count(), 0);
        assert_eq!(p.stats().acknowledged, 1);
    }

    #[test]
    fn test_abort_keeps_buffers_until_ack() {
        let mut p = pipeline(PipelineConfig {
            request_queue_depth: 2,
            ..Default::default()
        });
        let outcome = p.process_request(&FrameRequest::new(RequestId(1))).unwrap();
        let lut = outcome.commands.entry(BlockType::Gamma).unwrap().lut.unwrap();

        assert!(p.abort(RequestId(1)));
        assert_eq!(p.in_flight_state(RequestId(1)), Some(InFlightState::Aborted));
        let pool = p.block(BlockType::Gamma).unwrap().pool().unwrap();
        assert_eq!(pool.references(lut.handle.id), 1);

        // Still the current LUT, so unreferenced but not Free
        assert_eq!(p.acknowledge(RequestId(1)), 0);
        let pool = p.block(BlockType::Gamma).unwrap().pool().unwrap();
        assert_eq!(pool.references(lut.handle.id), 0);
        assert!(!p.abort(RequestId(1)));
    }

    #[test]
    fn test_config_debug_settings_apply_to_requests() {
        let (collab, sink) = collaborators();
        let mut config = PipelineConfig::default();
        config.debug.tuning_capture = true;
        config.module_overrides = vec![ModuleOverride {
            block: BlockType::Hdr,
            enable: false,
        }];
        let mut p = PipelineBuilder::new(config).build(collab).unwrap();
        assert!(!p.plan().contains(BlockType::Hdr));

        p.process_request(&FrameRequest::new(RequestId(1))).unwrap();
        let lut_blocks = p.blocks().iter().filter(|b| b.pool().is_some()).count();
        assert_eq!(sink.debug_tags().len(), lut_blocks);
    }

    struct PanickingCalculator;

    impl IqCalculator for PanickingCalculator {
        fn calculate(&self, input: &CalcInput<'_>, lut: &mut [u32]) -> PipelineResult<CalcOutput> {
            if input.block == BlockType::Gtm {
                panic!("numeric routine crashed");
            }
            SimCalculator::new().calculate(input, lut)
        }
    }

    #[test]
    fn test_worker_panic_fails_request() {
        let (mut collab, _) = collaborators();
        collab.calculator = Arc::new(PanickingCalculator);
        let mut p = PipelineBuilder::new(PipelineConfig {
            parallel_blocks: true,
            ..Default::default()
        })
        .build(collab)
        .unwrap();

        let err = p.process_request(&FrameRequest::new(RequestId(1))).unwrap_err();
        match err {
            PipelineError::FrameFailed { failures, .. } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].0, BlockType::Gtm);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(p.in_flight_count(), 0);
        assert_eq!(p.stats().failed_requests, 1);
    }

    struct CountingPlugin(Arc<Mutex<(u32, u64, u32)>>);

    impl StatsPlugin for CountingPlugin {
        fn name(&self) -> &str {
            "counting"
        }

        fn on_activate(&mut self, _plan: &ModulePlan) {
            self.0.lock().unwrap().0 += 1;
        }

        fn on_frame(&mut self, _record: &FrameMetadataRecord) {
            self.0.lock().unwrap().1 += 1;
        }

        fn on_deactivate(&mut self) {
            self.0.lock().unwrap().2 += 1;
        }
    }

    #[test]
    fn test_plugins_see_successful_frames_only() {
        let counts = Arc::new(Mutex::new((0, 0, 0)));
        let mut registry = PluginRegistry::new();
        let shared = counts.clone();
        registry
            .register("counting", move || -> Box<dyn StatsPlugin> {
                Box::new(CountingPlugin(shared.clone()))
            })
            .unwrap();

        let calculator = Arc::new(SimCalculator::new());
        let (mut collab, _) = collaborators();
        collab.calculator = calculator.clone();
        let config = PipelineConfig {
            stats_plugins: vec!["counting".into(), "absent".into()],
            ..Default::default()
        };
        let mut p = PipelineBuilder::new(config)
            .with_plugins(registry)
            .build(collab)
            .unwrap();

        p.process_request(&FrameRequest::new(RequestId(1))).unwrap();
        calculator.fail_block(BlockType::Lsc);
        let trigger = TriggerSnapshot {
            color_temperature: 6500.0,
            ..Default::default()
        };
        let _ = p.process_request(&FrameRequest::new(RequestId(2)).with_trigger(trigger));
        drop(p);

        assert_eq!(*counts.lock().unwrap(), (1, 1, 1));
    }

    #[test]
    fn test_incomplete_tag_registry() {
        let mut tags = TagRegistry::new();
        tags.register_section("org.bps.abf", &["firmware"]).unwrap();
        let err = PipelineBuilder::new(PipelineConfig::default())
            .with_tag_registry(tags)
            .build(collaborators().0)
            .err()
            .unwrap();
        assert!(matches!(err, BpsError::Config(_)));
    }
}
