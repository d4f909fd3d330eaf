//! Result type for the ICN DHT storage layer

use crate::error::Error;

/// Result type for the ICN DHT storage layer
pub type Result<T> = std::result::Result<T, Error>;
