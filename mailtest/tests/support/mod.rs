//! Shared infrastructure for end-to-end tests.

pub mod harness;

pub use harness::TestHarness;
