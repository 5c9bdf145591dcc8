//! # bps-iq: Bayer Processing Segment IQ pipeline
//!
//! Per-frame programming of the image-quality blocks of a camera ISP's Bayer
//! Processing Segment (BPS). For every capture request each hardware block
//! decides whether its tuning inputs changed, recomputes its registers and
//! lookup tables when they did, and emits its share of the hardware command
//! list together with per-frame metadata.
//!
//! ## Architecture
//!
//! - **Registry**: Static per-revision module tables, capabilities and named tags
//! - **Pipeline**: Block state machines, LUT buffer pools and the request loop
//! - **Backend**: Collaborator traits (tuning store, calculator, encoder,
//!   metadata sink) and simulated implementations
//! - **Config**: TOML/JSON pipeline configuration
//!
//! ## Configuration
//!
//! The simulator reads its config from the platform config directory under
//! `bps-iq/config.toml` unless a path is given:
//!
//! - **Linux**: `~/.config/bps-iq/`
//! - **macOS**: `~/Library/Application Support/bps-iq/`
//! - **Windows**: `%APPDATA%\bps-iq\`
//!
//! ## Example
//!
//! ```ignore
//! use bps_iq::{
//!     backend::mock_hw::{InMemoryTuningStore, RecordingMetadataSink, SimCalculator, SimEncoder, SimInterpolator},
//!     config::PipelineConfig,
//!     pipeline::{Collaborators, FrameRequest, PipelineBuilder},
//! };
//! use std::sync::Arc;
//!
//! let collaborators = Collaborators {
//!     tuning: Arc::new(InMemoryTuningStore::with_defaults()),
//!     interpolator: Arc::new(SimInterpolator),
//!     calculator: Arc::new(SimCalculator::new()),
//!     encoder: Arc::new(SimEncoder::new()),
//!     metadata: Arc::new(RecordingMetadataSink::new()),
//! };
//! let mut pipeline = PipelineBuilder::new(PipelineConfig::default()).build(collaborators)?;
//!
//! let id = pipeline.next_request_id();
//! let outcome = pipeline.process_request(&FrameRequest::new(id))?;
//! submit(&outcome.commands);
//! // later, when the hardware is done
//! pipeline.acknowledge(id);
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod types;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use error::{BpsError, Result};
pub use pipeline::{BpsPipeline, Collaborators, FrameOutcome, FrameRequest, PipelineBuilder};
pub use registry::{ModulePlan, PipelineAssembler};
pub use types::{BlockType, ChipRevision, TriggerSnapshot};
