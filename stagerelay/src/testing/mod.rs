//! Testing utilities for stage runs.
//!
//! Recording fakes for the four ports, a harness wiring them together, and
//! assertions over what they saw.

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_calls, assert_in_order, assert_single_report, assert_untouched};
pub use fixtures::{fast_request, final_request, sample_snapshot, TestHarness, TEST_WEBHOOK};
pub use mocks::{
    CallLog, InMemoryResultStore, RecordingDispatcher, RecordingProvider, RecordingStatusSink,
};
