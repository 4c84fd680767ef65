//! Test fixtures for stream definition test suites
//!
//! Entity builders with realistic field values, a deterministic clock and the
//! shared proptest configuration.

#![deny(unsafe_code)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod clock;
pub mod definitions;
pub mod proptest_config;

pub use clock::TestClock;
pub use definitions::{
    test_branch, test_branch_key, test_by, test_sink, test_sink_key, test_source, test_source_key,
};
