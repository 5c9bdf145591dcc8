//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use bps_iq::pipeline::{BpsPipeline, FrameOutcome, FrameRequest, PipelineError};

/// Process a request and panic with the error if it fails
pub fn process_ok(pipeline: &mut BpsPipeline, request: &FrameRequest) -> FrameOutcome {
    pipeline
        .process_request(request)
        .unwrap_or_else(|e| panic!("{} should succeed: {}", request.request_id, e))
}

/// Process a request expected to fail
pub fn process_err(pipeline: &mut BpsPipeline, request: &FrameRequest) -> PipelineError {
    match pipeline.process_request(request) {
        Ok(_) => panic!("{} should fail", request.request_id),
        Err(e) => e,
    }
}
