use std::time::Duration;

use serde::{Deserialize, Serialize};

use icn_common::PublicKey;

/// A stored entry: opaque payload plus expiration and ownership metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Data {
    payload: Vec<u8>,
    expiration_millis: u64,
    public_key: Option<PublicKey>,
    protected_entry: bool,
}

impl Data {
    /// Expiration value of entries that never expire
    pub const NEVER: u64 = u64::MAX;

    /// Create an unowned entry that never expires
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            expiration_millis: Self::NEVER,
            public_key: None,
            protected_entry: false,
        }
    }

    /// Expire at an absolute time in milliseconds since the UNIX epoch
    pub fn with_expiration(mut self, expiration_millis: u64) -> Self {
        self.expiration_millis = expiration_millis;
        self
    }

    /// Expire `ttl` after `now_millis`
    pub fn with_ttl(self, now_millis: u64, ttl: Duration) -> Self {
        let ttl_millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self.with_expiration(now_millis.saturating_add(ttl_millis))
    }

    /// Mark the entry as owned by `public_key`
    pub fn with_public_key(mut self, public_key: PublicKey) -> Self {
        self.public_key = Some(public_key);
        self
    }

    pub fn protected(mut self, protected_entry: bool) -> Self {
        self.protected_entry = protected_entry;
        self
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    pub fn expiration_millis(&self) -> u64 {
        self.expiration_millis
    }

    pub fn public_key(&self) -> Option<&PublicKey> {
        self.public_key.as_ref()
    }

    pub fn is_protected_entry(&self) -> bool {
        self.protected_entry
    }

    pub fn is_expired(&self, now_millis: u64) -> bool {
        self.expiration_millis <= now_millis
    }

    /// Whether a caller holding `public_key` may modify or delete this entry
    pub fn is_modifiable_by(&self, public_key: Option<&PublicKey>) -> bool {
        match &self.public_key {
            None => true,
            Some(owner) => public_key == Some(owner),
        }
    }
}
