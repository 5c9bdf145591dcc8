//! Error handling for bps-iq
//!
//! This module defines the crate-level error type used for configuration and
//! pipeline assembly failures, plus a Result alias for use throughout the
//! crate. Per-frame block failures use [`PipelineError`] and convert into
//! [`BpsError`] when they cross the crate boundary.

use crate::pipeline::error::PipelineError;
use crate::types::BlockType;
use thiserror::Error;

/// Main error type for bps-iq operations
#[derive(Error, Debug)]
pub enum BpsError {
    /// The raw chip revision id is not one of the supported revisions
    #[error("Unsupported chip revision 0x{raw:08X}")]
    UnsupportedRevision { raw: u32 },

    /// A module table entry is inconsistent (duplicate block, zero version, ...)
    #[error("Malformed module entry for {block}: {message}")]
    MalformedModuleEntry { block: BlockType, message: String },

    /// Errors related to configuration loading/saving/validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// A block could not be constructed for the selected revision
    #[error("Block creation failed for {block}: {message}")]
    BlockCreation { block: BlockType, message: String },

    /// Errors raised while executing a frame
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<BpsError>,
    },
}

impl BpsError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        BpsError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error belongs to the configuration class (fatal at
    /// construction, pipeline assembly must not continue)
    pub fn is_configuration(&self) -> bool {
        match self {
            BpsError::UnsupportedRevision { .. }
            | BpsError::MalformedModuleEntry { .. }
            | BpsError::Config(_)
            | BpsError::BlockCreation { .. } => true,
            BpsError::WithContext { source, .. } => source.is_configuration(),
            _ => false,
        }
    }
}

/// Result type alias for bps-iq operations
pub type Result<T> = std::result::Result<T, BpsError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, PipelineError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| BpsError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| BpsError::from(e).with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BpsError::UnsupportedRevision { raw: 0x0002_0000 };
        assert_eq!(err.to_string(), "Unsupported chip revision 0x00020000");
    }

    #[test]
    fn test_error_with_context() {
        let err = BpsError::Config("queue depth out of range".to_string());
        let with_ctx = err.with_context("Failed to load config");
        assert!(with_ctx.to_string().contains("Failed to load config"));
        assert!(with_ctx.is_configuration());
    }

    #[test]
    fn test_pipeline_error_converts() {
        let result: std::result::Result<(), PipelineError> =
            Err(PipelineError::BufferExhausted {
                block: BlockType::Abf,
                capacity: 2,
            });
        let err = result.context("frame 3").unwrap_err();
        assert!(err.to_string().contains("frame 3"));
        assert!(!err.is_configuration());
    }
}
