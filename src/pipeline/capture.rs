//! Per-frame metadata publishing and tuning capture.
//!
//! Publishing firmware data must succeed: downstream stages read it. Tuning
//! capture is diagnostics only; its failures are returned as
//! [`PipelineError::DebugCapture`], which is never fatal.

use crate::backend::calc::FirmwareData;
use crate::backend::metadata::MetadataSink;
use crate::pipeline::adapters::BlockTags;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::RequestId;
use crate::pipeline::strategy::{DebugTag, LutSegment};
use crate::types::BlockType;

/// Write a block's firmware data, enable flag and region to the frame
pub fn publish_firmware(
    sink: &dyn MetadataSink,
    request: RequestId,
    block: BlockType,
    tags: &BlockTags,
    enabled: bool,
    firmware: &FirmwareData,
) -> PipelineResult<()> {
    let fatal = |e: crate::backend::metadata::MetadataError| PipelineError::FirmwareMetadata {
        block,
        message: e.to_string(),
    };

    sink.write_property(request, tags.firmware, &firmware.to_bytes())
        .map_err(fatal)?;
    sink.write_property(request, tags.enable, &[enabled as u8])
        .map_err(fatal)?;
    if let Some(roi) = firmware.region {
        let mut bytes = Vec::with_capacity(16);
        for v in [roi.x, roi.y, roi.width, roi.height] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        sink.write_property(request, tags.roi, &bytes).map_err(fatal)?;
    }
    Ok(())
}

/// Copy the LUT segments into the frame's debug record.
///
/// Data beyond `capacity_bytes` is dropped with an error log. Returns the
/// number of bytes captured.
pub fn capture_tuning(
    sink: &dyn MetadataSink,
    request: RequestId,
    block: BlockType,
    tag: DebugTag,
    segments: &[LutSegment],
    lut: &[u32],
    capacity_bytes: usize,
) -> PipelineResult<usize> {
    let capacity_words = capacity_bytes / std::mem::size_of::<u32>();
    let mut words = Vec::with_capacity(lut.len().min(capacity_words));
    let mut offset = 0;

    for segment in segments {
        let end = (offset + segment.entries).min(lut.len());
        let data = &lut[offset.min(end)..end];
        offset = end;

        let room = capacity_words - words.len();
        if data.len() > room {
            tracing::error!(
                "{}: tuning slot holds {} bytes, LUT {} truncated",
                block,
                capacity_bytes,
                segment.name
            );
            words.extend_from_slice(&data[..room]);
            break;
        }
        words.extend_from_slice(data);
    }

    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    sink.add_debug_tag(request, tag.id, tag.type_id, words.len(), &bytes)
        .map_err(|e| PipelineError::DebugCapture {
            block,
            message: e.to_string(),
        })?;
    Ok(bytes.len())
}
