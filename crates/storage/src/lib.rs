//! Local storage engine of a DHT peer
//!
//! This crate provides the in-memory store that holds a peer's partition of
//! the key space, including:
//! - Ordered primary storage keyed by (location, domain, content)
//! - Domain protection (per (location, domain) ownership claims)
//! - Responsibility tracking between keys and peers
//! - Expiration scheduling with lazy and timer-driven eviction
//! - XOR digests for anti-entropy comparison
//! - Diagnostics counters

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use icn_common::{Id160, PublicKey, StorageKey};

pub mod clock;
pub mod data;
pub mod expiration;
pub mod memory_storage;
pub mod metrics;
pub mod protection;
pub mod responsibility;
pub mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use data::Data;
pub use memory_storage::MemoryStorage;
pub use metrics::MetricsSnapshot;
pub use protection::{DomainOverride, ProtectionPolicy};
pub use sweeper::spawn_expiration_sweeper;

pub use icn_config::ClaimPurge;

/// Storage-related errors.
///
/// Denials and missing keys are ordinary results of the `Storage` methods and
/// never show up here.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Index out of sync: {0}")]
    InvariantViolation(String),
}

impl From<icn_config::ConfigError> for StorageError {
    fn from(err: icn_config::ConfigError) -> Self {
        StorageError::Configuration(err.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Summary of a key set used to compare replicas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DigestInfo {
    /// XOR of the content keys of all matching entries
    pub hash: Id160,
    /// Number of matching entries
    pub size: usize,
}

impl DigestInfo {
    pub fn new(hash: Id160, size: usize) -> Self {
        Self { hash, size }
    }
}

/// The contract every storage implementation must support.
///
/// All methods are synchronous and atomic with respect to each other. Each
/// call first evicts every entry whose expiration has passed, so expired
/// entries are never observable.
pub trait Storage: Send + Sync {
    /// Store `data` under `key`.
    ///
    /// Fails when `data` names an owner other than `public_key`, when the
    /// domain is protected by another key, when `put_if_absent` is set and
    /// the key exists, or when the existing entry is owned by a different
    /// public key.
    fn put(
        &self,
        key: StorageKey,
        data: Data,
        public_key: Option<&PublicKey>,
        put_if_absent: bool,
        domain_protection: bool,
    ) -> bool;

    /// Retrieve the entry stored under `key`
    fn get(&self, key: &StorageKey) -> Option<Data>;

    /// Copy the entries in `[from, to)`; a missing bound is open-ended.
    /// Returns `None` when both bounds are missing.
    fn get_range(
        &self,
        from: Option<&StorageKey>,
        to: Option<&StorageKey>,
    ) -> Option<BTreeMap<StorageKey, Data>>;

    /// Remove the entry under `key` if the caller may modify it.
    /// The master key gets no override here, only in `remove_range`.
    fn remove(&self, key: &StorageKey, public_key: Option<&PublicKey>) -> Option<Data>;

    /// Remove the entries in `[from, to)` that the caller may modify.
    ///
    /// Both bounds must lie in the same (location, domain); a missing bound
    /// extends to the edge of that domain. Returns `None` for cross-domain
    /// requests, for a domain protected by someone else, and when both
    /// bounds are missing.
    fn remove_range(
        &self,
        from: Option<&StorageKey>,
        to: Option<&StorageKey>,
        public_key: Option<&PublicKey>,
    ) -> Option<BTreeMap<StorageKey, Data>>;

    /// Check whether an entry is stored under `key`
    fn contains(&self, key: &StorageKey) -> bool;

    /// Digest of the entries in `[from, to)`, same bounds as `get_range`
    fn digest_range(&self, from: Option<&StorageKey>, to: Option<&StorageKey>) -> DigestInfo;

    /// Digest of the given keys that are currently stored
    fn digest_keys(&self, keys: &[StorageKey]) -> DigestInfo;

    /// Visit every entry under `location` in key order
    fn for_each_under_location(
        &self,
        location: &Id160,
        visitor: &mut dyn FnMut(&StorageKey, &Data),
    );

    /// Record `peer` as responsible for `key`; returns whether the assignment changed
    fn update_responsibility(&self, key: Id160, peer: Id160) -> bool;

    /// The peer currently responsible for `key`
    fn find_responsible_peer(&self, key: &Id160) -> Option<Id160>;

    /// All keys `peer` is currently responsible for
    fn find_responsible_data(&self, peer: &Id160) -> HashSet<Id160>;

    /// Keys that need direct replication after a restart
    fn stored_direct_replication(&self) -> Vec<StorageKey>;

    /// Drop all stored state
    fn close(&self);
}
