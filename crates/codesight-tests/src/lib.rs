//! codesight test support
//!
//! This crate holds the integration tests of the codesight workspace together
//! with the test doubles they share.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Concurrency testing utilities
///
/// Meters that record how many service calls overlap.
pub mod concurrency_utils;

/// Unified test utilities
///
/// Scripted service, recording host collaborators and in-memory files used
/// across all test files.
pub mod test_utils;

pub use concurrency_utils::{InFlightGuard, InFlightMeter};
pub use test_utils::{
    bundle, failure, fast_options, init_test_logging, small_payload_options, AnalysisBuilder,
    Call, MemoryFiles, MockAnalysisService, RecordingHost, TestBed,
};
