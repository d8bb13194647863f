//! Result type alias for codesight operations

use crate::Error;

/// Result type alias for codesight operations
pub type Result<T> = std::result::Result<T, Error>;
