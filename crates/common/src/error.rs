//! Error types for the ICN DHT storage layer

use thiserror::Error;

/// Common error type for key parsing and process setup
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed identifier or key material
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new invalid key error
    pub fn invalid_key<S: Into<String>>(msg: S) -> Self {
        Error::InvalidKey(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }
}

impl From<hex::FromHexError> for Error {
    fn from(err: hex::FromHexError) -> Self {
        Error::InvalidKey(err.to_string())
    }
}
