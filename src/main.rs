//! BPS pipeline simulator - Main Entry Point
//!
//! Drives the per-frame BPS pipeline against the simulated tuning store,
//! calculator, encoder and metadata sink, with a configurable hardware
//! completion delay.

use anyhow::{Context, Result};
use bps_iq::{
    backend::mock_hw::{
        InMemoryTuningStore, RecordingMetadataSink, SimCalculator, SimEncoder, SimInterpolator,
    },
    config::{default_config_path, LoggingConfig, PipelineConfig},
    pipeline::{BpsPipeline, Collaborators, FrameMetadataRecord, FrameRequest, PipelineBuilder},
    types::{FrameControls, NoiseReductionMode, TriggerSnapshot},
};
use clap::Parser;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "bps-sim")]
#[command(about = "Simulate per-frame BPS IQ programming")]
#[command(version)]
struct Args {
    /// Config file (TOML or JSON). Defaults to the platform config directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of requests to process
    #[arg(short, long, default_value = "30")]
    frames: u64,

    /// Frames between a request's submission and its hardware completion
    #[arg(short, long, default_value = "2")]
    ack_lag: usize,

    /// Print the last frame's metadata record as JSON
    #[arg(long)]
    json: bool,
}

fn init_logging(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.filter))
        .context("Invalid log filter")?;

    let (file_layer, guard) = match &logging.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &logging.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

fn load_config(path: Option<PathBuf>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(&path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(PipelineConfig::load_or_default()),
    }
}

/// Trigger and controls for frame `n`: gain ramps, lux drifts, and noise
/// reduction is switched off for a stretch in the middle of the run.
fn frame_inputs(n: u64, frames: u64) -> (TriggerSnapshot, FrameControls) {
    let trigger = TriggerSnapshot {
        aec_gain: 1.0 + (n / 5) as f32,
        lux_index: 350.0 - (n / 10) as f32 * 50.0,
        ..Default::default()
    };
    let mut controls = FrameControls::default();
    if n > frames / 3 && n <= frames / 2 {
        controls.noise_reduction = NoiseReductionMode::Off;
    }
    (trigger, controls)
}

fn run(pipeline: &mut BpsPipeline, args: &Args) -> Result<Option<FrameMetadataRecord>> {
    let completions = pipeline.completion_sender();
    let mut pending = VecDeque::new();
    let mut last_record = None;

    for n in 0..args.frames {
        let id = pipeline.next_request_id();
        let (trigger, controls) = frame_inputs(n, args.frames);
        let request = FrameRequest::new(id)
            .with_trigger(trigger)
            .with_controls(controls);

        match pipeline.process_request(&request) {
            Ok(outcome) => {
                tracing::info!(
                    "{}: {} commands, recomputed [{}]",
                    id,
                    outcome.commands.len(),
                    outcome
                        .recomputed
                        .iter()
                        .map(|b| b.name())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                pending.push_back(id);
                last_record = Some(outcome.metadata);
            }
            Err(e) => tracing::error!("{}", e),
        }

        while pending.len() > args.ack_lag {
            if let Some(done) = pending.pop_front() {
                completions.send(done).context("Completion queue closed")?;
            }
        }
    }

    for done in pending.drain(..) {
        completions.send(done).context("Completion queue closed")?;
    }
    pipeline.drain_completions();

    Ok(last_record)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.clone())?;
    let _guard = init_logging(&config.logging)?;

    tracing::info!(
        "Starting BPS simulator ({} frames, ack lag {})",
        args.frames,
        args.ack_lag
    );
    if args.config.is_none() {
        if let Some(path) = default_config_path() {
            tracing::debug!("Config path: {}", path.display());
        }
    }

    let collaborators = Collaborators {
        tuning: Arc::new(InMemoryTuningStore::with_defaults()),
        interpolator: Arc::new(SimInterpolator),
        calculator: Arc::new(SimCalculator::new()),
        encoder: Arc::new(SimEncoder::new()),
        metadata: Arc::new(RecordingMetadataSink::new()),
    };
    let mut pipeline = PipelineBuilder::new(config)
        .build(collaborators)
        .context("Failed to build pipeline")?;

    let last_record = run(&mut pipeline, &args)?;

    let stats = pipeline.stats();
    tracing::info!(
        "Processed {} requests ({} failed), {} block recomputations",
        stats.requests,
        stats.failed_requests,
        stats.recomputations
    );
    for (block, pool) in pipeline.pool_summary() {
        tracing::info!(
            "{}: {}/{} free, peak {} in use, {} fetches, {} exhausted",
            block,
            pool.free,
            pool.capacity,
            pool.peak_in_use,
            pool.fetches,
            pool.exhaustions
        );
    }

    if args.json {
        if let Some(record) = last_record {
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }

    Ok(())
}
