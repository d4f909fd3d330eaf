//! Intercooperative Network (ICN) DHT storage
//!
//! The local storage engine of a DHT peer together with the key-space
//! types and configuration it is built on.

/// Module version information
pub mod version {
    /// The current version of the ICN DHT library
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

pub use icn_common as common;
pub use icn_config as config;
pub use icn_storage as storage;
