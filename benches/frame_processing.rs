//! Benchmarks for per-frame pipeline processing
//!
//! Run with: cargo bench

use bps_iq::backend::mock_hw::{
    InMemoryTuningStore, RecordingMetadataSink, SimCalculator, SimEncoder, SimInterpolator,
};
use bps_iq::backend::TuningSelector;
use bps_iq::config::PipelineConfig;
use bps_iq::pipeline::dependency::DetectorInput;
use bps_iq::pipeline::{
    BpsPipeline, Collaborators, DependencyTracker, FrameRequest, PipelineBuilder, RequestId,
};
use bps_iq::types::{BlockType, ChipRevision, FrameControls, TriggerSnapshot};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

fn pipeline(revision: ChipRevision, parallel: bool) -> BpsPipeline {
    let collaborators = Collaborators {
        tuning: Arc::new(InMemoryTuningStore::with_defaults()),
        interpolator: Arc::new(SimInterpolator),
        calculator: Arc::new(SimCalculator::new()),
        encoder: Arc::new(SimEncoder::new()),
        metadata: Arc::new(RecordingMetadataSink::new()),
    };
    let config = PipelineConfig {
        revision: revision.raw(),
        parallel_blocks: parallel,
        ..Default::default()
    };
    PipelineBuilder::new(config)
        .build(collaborators)
        .expect("pipeline should build")
}

/// Run one request and acknowledge it immediately
fn frame(pipeline: &mut BpsPipeline, id: u64, trigger: TriggerSnapshot) {
    let request = FrameRequest::new(RequestId(id)).with_trigger(trigger);
    let outcome = pipeline.process_request(&request).expect("frame should succeed");
    black_box(outcome.commands.payload_words());
    pipeline.acknowledge(RequestId(id));
}

fn bench_unchanged_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("unchanged_frames");

    for revision in [ChipRevision::Titan170, ChipRevision::Titan480] {
        group.bench_with_input(
            BenchmarkId::new("revision", revision),
            &revision,
            |b, &revision| {
                let mut p = pipeline(revision, false);
                let mut id = 0;
                b.iter(|| {
                    id += 1;
                    frame(&mut p, id, TriggerSnapshot::default());
                });
            },
        );
    }

    group.finish();
}

fn bench_changing_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("changing_frames");

    for parallel in [false, true] {
        let name = if parallel { "parallel" } else { "sequential" };
        group.bench_function(name, |b| {
            let mut p = pipeline(ChipRevision::Titan480, parallel);
            let mut id = 0u64;
            b.iter(|| {
                id += 1;
                let trigger = TriggerSnapshot {
                    lux_index: 100.0 + (id % 200) as f32,
                    ..Default::default()
                };
                frame(&mut p, id, trigger);
            });
        });
    }

    group.finish();
}

fn bench_dependency_check(c: &mut Criterion) {
    let store = InMemoryTuningStore::with_defaults();
    let selector = TuningSelector::default();
    let controls = FrameControls::default();
    let mut tracker = DependencyTracker::new(BlockType::Abf);
    let mut gain = 1.0f32;

    c.bench_function("dependency_check_abf", |b| {
        b.iter(|| {
            gain = if gain > 5.0 { 1.0 } else { gain + 0.25 };
            let trigger = TriggerSnapshot {
                aec_gain: gain,
                ..Default::default()
            };
            let input = DetectorInput {
                manual: None,
                selector: &selector,
                trigger: &trigger,
                controls: &controls,
            };
            black_box(tracker.evaluate(&input, &store))
        });
    });
}

criterion_group!(
    benches,
    bench_unchanged_frames,
    bench_changing_frames,
    bench_dependency_check
);
criterion_main!(benches);
