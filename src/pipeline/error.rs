//! Pipeline-specific error types.

use crate::pipeline::id::RequestId;
use crate::types::BlockType;
use thiserror::Error;

/// Failure classes. Configuration errors abort assembly, resource and
/// calculation errors fail the current request, metadata-capture errors are
/// logged and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Configuration,
    Resource,
    Calculation,
    MetadataCapture,
}

/// Errors that can occur while executing a block or a frame.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("{block}: LUT buffer pool exhausted ({capacity} buffers in flight)")]
    BufferExhausted { block: BlockType, capacity: usize },

    #[error("{block}: write of {requested} words exceeds buffer capacity {capacity}")]
    WriteOverflow {
        block: BlockType,
        requested: usize,
        capacity: usize,
    },

    #[error("{block}: invalid buffer state: {message}")]
    InvalidBufferState { block: BlockType, message: String },

    #[error("{block}: calculation failed: {message}")]
    Calculation { block: BlockType, message: String },

    #[error("{block}: command encoding failed: {message}")]
    Encode { block: BlockType, message: String },

    #[error("{block}: firmware metadata publish failed: {message}")]
    FirmwareMetadata { block: BlockType, message: String },

    #[error("{block}: debug capture failed: {message}")]
    DebugCapture { block: BlockType, message: String },

    #[error("{block}: worker thread panicked")]
    WorkerPanicked { block: BlockType },

    #[error("Request {request} failed in {} block(s)", failures.len())]
    FrameFailed {
        request: RequestId,
        failures: Vec<(BlockType, String)>,
    },
}

impl PipelineError {
    /// Which failure class this error belongs to
    pub fn class(&self) -> ErrorClass {
        match self {
            PipelineError::BufferExhausted { .. }
            | PipelineError::WriteOverflow { .. }
            | PipelineError::InvalidBufferState { .. }
            | PipelineError::WorkerPanicked { .. }
            | PipelineError::FrameFailed { .. } => ErrorClass::Resource,
            PipelineError::Calculation { .. }
            | PipelineError::Encode { .. }
            | PipelineError::FirmwareMetadata { .. } => ErrorClass::Calculation,
            PipelineError::DebugCapture { .. } => ErrorClass::MetadataCapture,
        }
    }

    /// Whether this error must fail the request
    pub fn is_fatal(&self) -> bool {
        self.class() != ErrorClass::MetadataCapture
    }

    /// The block this error was raised by, if any
    pub fn block(&self) -> Option<BlockType> {
        match self {
            PipelineError::BufferExhausted { block, .. }
            | PipelineError::WriteOverflow { block, .. }
            | PipelineError::InvalidBufferState { block, .. }
            | PipelineError::Calculation { block, .. }
            | PipelineError::Encode { block, .. }
            | PipelineError::FirmwareMetadata { block, .. }
            | PipelineError::DebugCapture { block, .. }
            | PipelineError::WorkerPanicked { block } => Some(*block),
            PipelineError::FrameFailed { .. } => None,
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
