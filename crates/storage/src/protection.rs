//! Domain protection
//!
//! A (location, domain) pair can be claimed by a public key. Once claimed,
//! only the claimer (or, under [`DomainOverride::MasterKey`], the master key)
//! may write into or delete from that domain.

use std::collections::HashMap;

use tracing::debug;

use icn_common::{LocationDomain, PublicKey};
use icn_config::{ClaimPurge, ProtectionMode, StorageConfig};

use crate::{StorageError, StorageResult};

/// Who, besides the claimer, may take over a claimed domain
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DomainOverride {
    #[default]
    None,
    MasterKey(PublicKey),
}

/// Protection policy fixed at engine construction
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProtectionPolicy {
    pub domain_override: DomainOverride,
    pub claim_purge: ClaimPurge,
}

impl ProtectionPolicy {
    pub fn new(domain_override: DomainOverride, claim_purge: ClaimPurge) -> Self {
        Self {
            domain_override,
            claim_purge,
        }
    }

    pub fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        let domain_override = match config.protection_mode {
            ProtectionMode::None => DomainOverride::None,
            ProtectionMode::Master => match &config.master_public_key {
                Some(key) => DomainOverride::MasterKey(key.clone()),
                None => {
                    return Err(StorageError::Configuration(
                        "master protection mode without a master public key".to_string(),
                    ))
                }
            },
        };

        Ok(Self::new(domain_override, config.claim_purge))
    }

    /// Whether `public_key` may supersede somebody else's claim
    pub fn can_override(&self, public_key: Option<&PublicKey>) -> bool {
        match (&self.domain_override, public_key) {
            (DomainOverride::MasterKey(master), Some(key)) => master == key,
            _ => false,
        }
    }

    pub fn purges_on_claim(&self) -> bool {
        self.claim_purge == ClaimPurge::RemoveUnowned
    }
}

/// Result of evaluating a write against the protection table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimDecision {
    Denied,
    /// Write allowed, the claim table stays as it is
    Allowed,
    /// Write allowed and `owner` (re)claims the domain
    Claim { owner: PublicKey, changed: bool },
}

/// Map from (location, domain) to the key that claimed it
#[derive(Debug, Default)]
pub struct ProtectionTable {
    claims: HashMap<LocationDomain, PublicKey>,
}

impl ProtectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(&self, location_domain: &LocationDomain) -> Option<&PublicKey> {
        self.claims.get(location_domain)
    }

    /// True if the domain is claimed by a key other than `public_key`
    pub fn is_protected_by_others(
        &self,
        location_domain: &LocationDomain,
        public_key: Option<&PublicKey>,
    ) -> bool {
        match self.claims.get(location_domain) {
            None => false,
            Some(owner) => public_key != Some(owner),
        }
    }

    /// Decide whether a write may proceed, without changing the table.
    ///
    /// An unprotected write needs an unclaimed domain or the caller's own
    /// claim. A protected write additionally needs a key, and may take over
    /// a foreign claim only if the policy lets that key override.
    pub fn evaluate(
        &self,
        location_domain: &LocationDomain,
        public_key: Option<&PublicKey>,
        request_protection: bool,
        policy: &ProtectionPolicy,
    ) -> ClaimDecision {
        let protected_by_others = self.is_protected_by_others(location_domain, public_key);

        if !request_protection {
            return if protected_by_others {
                ClaimDecision::Denied
            } else {
                ClaimDecision::Allowed
            };
        }

        let Some(key) = public_key else {
            return ClaimDecision::Denied;
        };

        if protected_by_others && !policy.can_override(Some(key)) {
            return ClaimDecision::Denied;
        }

        ClaimDecision::Claim {
            owner: key.clone(),
            changed: self.claims.get(location_domain) != Some(key),
        }
    }

    /// Whether a range delete inside the domain may proceed
    pub fn may_remove(
        &self,
        location_domain: &LocationDomain,
        public_key: Option<&PublicKey>,
        policy: &ProtectionPolicy,
    ) -> bool {
        !self.is_protected_by_others(location_domain, public_key) || policy.can_override(public_key)
    }

    /// Record `owner` as the claimer of the domain, returning the previous claimer
    pub fn claim(
        &mut self,
        location_domain: LocationDomain,
        owner: PublicKey,
    ) -> Option<PublicKey> {
        debug!(domain = %location_domain, owner = %owner, "Domain claimed");
        self.claims.insert(location_domain, owner)
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    pub fn clear(&mut self) {
        self.claims.clear();
    }
}
