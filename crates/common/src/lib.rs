//! Common types for the ICN DHT storage layer
//!
//! This crate provides the pieces every storage component builds on:
//! - Fixed-width key-space identifiers and their composites
//! - Opaque public keys used for ownership and domain protection
//! - The shared error and result types
//! - Logging initialization

pub mod error;
pub mod keys;
pub mod logging;
pub mod result;

pub use error::Error;
pub use keys::{Id160, LocationDomain, PublicKey, StorageKey, ID_LENGTH};
pub use result::Result;
