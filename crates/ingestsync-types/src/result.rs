//! Result type alias for IngestSync operations

use crate::Error;

/// Result type alias for IngestSync operations
pub type Result<T> = std::result::Result<T, Error>;
