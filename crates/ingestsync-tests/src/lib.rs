//! IngestSync Testing Suite
//!
//! This crate provides end-to-end scenario tests for the IngestSync crates
//! together with the shared fixtures they use.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Unified test utilities
///
/// Scratch source/destination trees and engine settings shared by the
/// integration tests.
pub mod test_utils;

pub use test_utils::{create_test_file, SyncFixture};
