//! Metadata boundary
//!
//! Per-frame properties are written by tag id into the frame's metadata pool;
//! debug tags go into the frame's debug-data stream. The sink does not know
//! which block is writing, so it reports a plain [`MetadataError`] and the
//! caller attaches the block.

use crate::pipeline::id::RequestId;
use crate::registry::TagId;
use thiserror::Error;

/// A metadata write was rejected by the sink
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("metadata write rejected: {0}")]
pub struct MetadataError(pub String);

#[cfg_attr(test, mockall::automock)]
pub trait MetadataSink: Send + Sync {
    /// Write a named property for a request
    fn write_property(
        &self,
        request: RequestId,
        tag: TagId,
        bytes: &[u8],
    ) -> Result<(), MetadataError>;

    /// Append a debug tag for a request
    fn add_debug_tag(
        &self,
        request: RequestId,
        tag_id: u32,
        type_id: u32,
        count: usize,
        bytes: &[u8],
    ) -> Result<(), MetadataError>;
}
