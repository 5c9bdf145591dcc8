//! Per-frame BPS pipeline.
//!
//! An assembled [`ModulePlan`](crate::registry::ModulePlan) becomes an ordered
//! list of [`IqBlock`]s. Every request runs through each block's protocol:
//!
//! ```text
//! dependency check ──► (changed) interpolate ──► fetch LUT ──► calculate ──► commit + flip bank
//!        │                                                                         │
//!        └──────────────► (enabled) encode command ◄───────────────────────────────┘
//!                                   │
//!                                   ▼
//!                      publish firmware ──► tuning capture
//! ```
//!
//! # Design
//!
//! - **One state machine per block** - [`DependencyTracker`] decides whether a
//!   block must recompute, with hysteresis on dynamic feature enables.
//! - **Double-buffered LUTs** - [`LutBufferPool`] holds one buffer per in-flight
//!   request; a buffer is reused only after the hardware acknowledged every
//!   request that referenced it.
//! - **Explicit failure** - blocks return [`PipelineResult`]; the pipeline fails
//!   the whole request on any fatal block error.
//! - **Disjoint block state** - blocks of one frame may run on scoped threads.

pub mod adapters;
pub mod block;
pub mod capture;
pub mod dependency;
pub mod error;
pub mod executor;
pub mod frame;
pub mod hysteresis;
pub mod id;
pub mod lut_pool;
pub mod plugin;
pub mod strategy;

pub use block::{BlockReport, BlockServices, IqBlock};
pub use dependency::{ChangeDecision, ChangeReason, DependencyTracker, Evaluation};
pub use error::{ErrorClass, PipelineError, PipelineResult};
pub use executor::{BpsPipeline, Collaborators, InFlightState, PipelineBuilder, PipelineStats};
pub use frame::{
    BlockMetadata, CommandEntry, CommandList, FrameMetadataRecord, FrameOutcome, FrameRequest,
};
pub use id::{BlockId, BufferId, RequestId};
pub use lut_pool::{BufferState, CommittedLut, LutBufferHandle, LutBufferPool, PoolStats};
pub use plugin::{BlockActivityPlugin, PluginRegistry, StatsPlugin};
pub use strategy::{HwSetting, HwStrategy, LutSegment};
