//! Core data model and error handling for IngestSync
//!
//! This crate provides the types shared by every IngestSync crate:
//!
//! - **Error handling**: one error enum with path-aware I/O variants
//! - **Package model**: the per-package lifecycle counters and their transitions
//! - **Registry**: the keyed collection of packages persisted between runs
//!
//! # Features
//!
//! - `serde`: Enable serialization support
//!
//! # Examples
//!
//! ```rust
//! use ingestsync_types::{Fingerprint, Package, PackageState};
//! use std::path::PathBuf;
//!
//! let mut package = Package::new(
//!     "acme",
//!     "alice",
//!     "batch1",
//!     PathBuf::from("/src/acme-alice/batch1"),
//!     PathBuf::from("/dst/acme"),
//!     PathBuf::from("/dst/acme/in/vendors/alice/batch1"),
//! );
//! package.observe(Fingerprint::from_hex("c0ffee"));
//! package.observe(Fingerprint::from_hex("c0ffee"));
//! assert_eq!(package.state(3, 2), PackageState::Stabilizing);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod package;
pub mod result;

// Re-export commonly used types
pub use error::Error;
pub use package::{
    normalize_path, DestinationIndex, Fingerprint, Observation, Package, PackageKey,
    PackageState, Registry,
};
pub use result::Result;
