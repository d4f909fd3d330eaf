use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ops::Bound;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use icn_common::{Id160, LocationDomain, PublicKey, StorageKey};
use icn_config::StorageConfig;

use crate::clock::{Clock, SystemClock};
use crate::data::Data;
use crate::expiration::ExpirationSchedule;
use crate::metrics::{MetricsSnapshot, StorageMetrics};
use crate::protection::{ClaimDecision, ProtectionPolicy, ProtectionTable};
use crate::responsibility::ResponsibilityTable;
use crate::{DigestInfo, Storage, StorageError, StorageResult};

/// Everything guarded by the engine lock. These indexes must agree with
/// each other whenever the lock is released.
#[derive(Debug, Default)]
struct StorageState {
    data: BTreeMap<StorageKey, Data>,
    protection: ProtectionTable,
    responsibility: ResponsibilityTable,
    expiration: ExpirationSchedule,
    metrics: StorageMetrics,
}

impl StorageState {
    /// Remove every entry due at or before `now`, ignoring ownership
    fn evict_expired(&mut self, now: u64) -> Vec<StorageKey> {
        let expired = self.expiration.take_expired(now);
        for key in &expired {
            match self.data.remove(key) {
                Some(_) => {
                    self.responsibility.remove(&key.location);
                    self.metrics.record_eviction();
                    debug!(key = %key, "Removed key due to expiration");
                }
                None => {
                    self.metrics.record_eviction_anomaly();
                    warn!(
                        key = %key,
                        "Expired key had no stored entry, dropped it from the schedule"
                    );
                }
            }
        }
        expired
    }

    fn remove_entry(&mut self, key: &StorageKey) -> Option<Data> {
        let data = self.data.remove(key)?;
        self.expiration.unschedule(key);
        self.responsibility.remove(&key.location);
        Some(data)
    }

    fn entries_in(
        &self,
        lower: Bound<StorageKey>,
        upper: Bound<StorageKey>,
    ) -> impl Iterator<Item = (&StorageKey, &Data)> + '_ {
        let valid = is_valid_range(&lower, &upper);
        let bounds = if valid {
            (lower, upper)
        } else {
            (Bound::Unbounded, Bound::Unbounded)
        };
        self.data.range(bounds).take(if valid { usize::MAX } else { 0 })
    }

    fn copy_range(
        &self,
        lower: Bound<StorageKey>,
        upper: Bound<StorageKey>,
    ) -> BTreeMap<StorageKey, Data> {
        self.entries_in(lower, upper)
            .map(|(key, data)| (*key, data.clone()))
            .collect()
    }

    fn purge_unowned(&mut self, location_domain: &LocationDomain) {
        let keys: Vec<StorageKey> = self
            .entries_in(
                Bound::Included(location_domain.min()),
                Bound::Included(location_domain.max()),
            )
            .filter(|(_, data)| data.public_key().is_none())
            .map(|(key, _)| *key)
            .collect();

        for key in &keys {
            self.remove_entry(key);
        }
        if !keys.is_empty() {
            debug!(
                domain = %location_domain,
                count = keys.len(),
                "Purged unowned entries on domain claim"
            );
        }
    }

    fn put(
        &mut self,
        key: StorageKey,
        data: Data,
        public_key: Option<&PublicKey>,
        put_if_absent: bool,
        domain_protection: bool,
        policy: &ProtectionPolicy,
    ) -> bool {
        if data.public_key().is_some() && data.public_key() != public_key {
            self.metrics.record_denied();
            trace!(key = %key, "Put denied, entry owner differs from the caller key");
            return false;
        }

        let location_domain = key.location_domain();
        let decision = self
            .protection
            .evaluate(&location_domain, public_key, domain_protection, policy);

        let purge = match &decision {
            ClaimDecision::Denied => {
                self.metrics.record_denied();
                trace!(key = %key, "Put denied by domain protection");
                return false;
            }
            ClaimDecision::Allowed => false,
            ClaimDecision::Claim { changed, .. } => *changed && policy.purges_on_claim(),
        };

        // An unowned entry that the claim is about to purge no longer counts as present.
        let existing = self
            .data
            .get(&key)
            .filter(|old| !(purge && old.public_key().is_none()));
        if let Some(old) = existing {
            if put_if_absent {
                return false;
            }
            if !old.is_modifiable_by(public_key) {
                self.metrics.record_denied();
                trace!(key = %key, "Put denied, entry owned by another key");
                return false;
            }
        }

        if let ClaimDecision::Claim { owner, changed } = decision {
            if changed {
                self.protection.claim(location_domain, owner);
            }
        }
        if purge {
            self.purge_unowned(&location_domain);
        }

        let expires_at = data.expiration_millis();
        self.data.insert(key, data);
        self.expiration.schedule(key, expires_at);
        true
    }

    fn check_invariants(&self) -> StorageResult<()> {
        if let Some(problem) = self.expiration.find_inconsistency() {
            return Err(StorageError::InvariantViolation(problem));
        }
        if let Some(problem) = self.responsibility.find_inconsistency() {
            return Err(StorageError::InvariantViolation(problem));
        }
        if self.expiration.len() != self.data.len() {
            return Err(StorageError::InvariantViolation(format!(
                "{} stored entries but {} scheduled expirations",
                self.data.len(),
                self.expiration.len()
            )));
        }
        for (key, data) in &self.data {
            let scheduled = self.expiration.expiration_of(key);
            if scheduled != Some(data.expiration_millis()) {
                return Err(StorageError::InvariantViolation(format!(
                    "key {} expires at {} but is scheduled at {:?}",
                    key,
                    data.expiration_millis(),
                    scheduled
                )));
            }
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.data.clear();
        self.protection.clear();
        self.responsibility.clear();
        self.expiration.clear();
    }
}

fn is_valid_range(lower: &Bound<StorageKey>, upper: &Bound<StorageKey>) -> bool {
    match (lower, upper) {
        (Bound::Included(l) | Bound::Excluded(l), Bound::Included(u) | Bound::Excluded(u)) => {
            l < u || (l == u && !matches!((lower, upper), (Bound::Excluded(_), Bound::Excluded(_))))
        }
        _ => true,
    }
}

fn read_bounds(
    from: Option<&StorageKey>,
    to: Option<&StorageKey>,
) -> (Bound<StorageKey>, Bound<StorageKey>) {
    (
        from.map_or(Bound::Unbounded, |key| Bound::Included(*key)),
        to.map_or(Bound::Unbounded, |key| Bound::Excluded(*key)),
    )
}

/// In-memory storage engine.
///
/// Primary data, domain claims, responsibilities and the expiration schedule
/// all sit behind one mutex. Every public operation takes the lock, evicts
/// expired entries and then does its work before releasing it, so callers
/// never see a partially applied change or an expired entry.
pub struct MemoryStorage {
    state: Mutex<StorageState>,
    policy: ProtectionPolicy,
    clock: Arc<dyn Clock>,
    started_at: Instant,
}

impl MemoryStorage {
    /// Create an engine that uses wall-clock time
    pub fn new(policy: ProtectionPolicy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    pub fn with_clock(policy: ProtectionPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(StorageState::default()),
            policy,
            clock,
            started_at: Instant::now(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        config.validate()?;
        Ok(Self::new(ProtectionPolicy::from_config(config)?))
    }

    pub fn policy(&self) -> &ProtectionPolicy {
        &self.policy
    }

    /// Take the lock and evict whatever has expired
    fn lock_fresh(&self) -> MutexGuard<'_, StorageState> {
        let mut state = self.state.lock();
        state.evict_expired(self.clock.now_millis());
        state
    }

    /// Evict expired entries now, returning their keys
    pub fn sweep_expired(&self) -> Vec<StorageKey> {
        let mut state = self.state.lock();
        state.evict_expired(self.clock.now_millis())
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.lock_fresh().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The key that currently claims `location_domain`
    pub fn domain_owner(&self, location_domain: &LocationDomain) -> Option<PublicKey> {
        self.lock_fresh().protection.owner(location_domain).cloned()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        let state = self.state.lock();
        MetricsSnapshot {
            operation_counts: state.metrics.operation_counts().clone(),
            eviction_counts: state.metrics.eviction_counts().clone(),
            stored_entries: state.data.len(),
            domain_claims: state.protection.len(),
            responsibilities: state.responsibility.len(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            timestamp: self.clock.now_millis(),
        }
    }

    /// Check that every secondary index mirrors the primary store
    pub fn verify_integrity(&self) -> StorageResult<()> {
        self.state.lock().check_invariants()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(ProtectionPolicy::default())
    }
}

impl Storage for MemoryStorage {
    fn put(
        &self,
        key: StorageKey,
        data: Data,
        public_key: Option<&PublicKey>,
        put_if_absent: bool,
        domain_protection: bool,
    ) -> bool {
        let mut state = self.lock_fresh();
        let stored = state.put(
            key,
            data,
            public_key,
            put_if_absent,
            domain_protection,
            &self.policy,
        );
        state.metrics.record_put(stored);
        stored
    }

    fn get(&self, key: &StorageKey) -> Option<Data> {
        let mut state = self.lock_fresh();
        state.metrics.record_get();
        state.data.get(key).cloned()
    }

    fn get_range(
        &self,
        from: Option<&StorageKey>,
        to: Option<&StorageKey>,
    ) -> Option<BTreeMap<StorageKey, Data>> {
        let state = self.lock_fresh();
        if from.is_none() && to.is_none() {
            return None;
        }
        let (lower, upper) = read_bounds(from, to);
        Some(state.copy_range(lower, upper))
    }

    fn remove(&self, key: &StorageKey, public_key: Option<&PublicKey>) -> Option<Data> {
        let mut state = self.lock_fresh();
        if state
            .protection
            .is_protected_by_others(&key.location_domain(), public_key)
        {
            state.metrics.record_denied();
            trace!(key = %key, "Remove denied by domain protection");
            return None;
        }

        if !state.data.get(key)?.is_modifiable_by(public_key) {
            state.metrics.record_denied();
            trace!(key = %key, "Remove denied, entry owned by another key");
            return None;
        }

        let removed = state.remove_entry(key);
        state.metrics.record_removes(1);
        removed
    }

    fn remove_range(
        &self,
        from: Option<&StorageKey>,
        to: Option<&StorageKey>,
        public_key: Option<&PublicKey>,
    ) -> Option<BTreeMap<StorageKey, Data>> {
        let mut state = self.lock_fresh();
        let location_domain = match (from, to) {
            (None, None) => return None,
            (Some(from), Some(to)) if from.location_domain() != to.location_domain() => {
                trace!(from = %from, to = %to, "Rejected range removal across domains");
                return None;
            }
            (Some(key), _) | (None, Some(key)) => key.location_domain(),
        };

        if !state
            .protection
            .may_remove(&location_domain, public_key, &self.policy)
        {
            state.metrics.record_denied();
            trace!(domain = %location_domain, "Range removal denied by domain protection");
            return None;
        }

        let lower = Bound::Included(from.copied().unwrap_or_else(|| location_domain.min()));
        let upper = to.map_or(Bound::Included(location_domain.max()), |key| Bound::Excluded(*key));
        let keys: Vec<StorageKey> = state
            .entries_in(lower, upper)
            .filter(|(_, data)| data.is_modifiable_by(public_key))
            .map(|(key, _)| *key)
            .collect();

        let mut removed = BTreeMap::new();
        for key in keys {
            if let Some(data) = state.remove_entry(&key) {
                removed.insert(key, data);
            }
        }
        state.metrics.record_removes(removed.len());
        Some(removed)
    }

    fn contains(&self, key: &StorageKey) -> bool {
        self.lock_fresh().data.contains_key(key)
    }

    fn digest_range(&self, from: Option<&StorageKey>, to: Option<&StorageKey>) -> DigestInfo {
        let state = self.lock_fresh();
        if from.is_none() && to.is_none() {
            return DigestInfo::default();
        }
        let (lower, upper) = read_bounds(from, to);
        state
            .entries_in(lower, upper)
            .fold(DigestInfo::default(), |digest, (key, _)| {
                DigestInfo::new(digest.hash ^ key.content, digest.size + 1)
            })
    }

    fn digest_keys(&self, keys: &[StorageKey]) -> DigestInfo {
        let unique: BTreeSet<&StorageKey> = keys.iter().collect();
        let state = self.lock_fresh();
        unique
            .into_iter()
            .filter(|key| state.data.contains_key(*key))
            .fold(DigestInfo::default(), |digest, key| {
                DigestInfo::new(digest.hash ^ key.content, digest.size + 1)
            })
    }

    fn for_each_under_location(
        &self,
        location: &Id160,
        visitor: &mut dyn FnMut(&StorageKey, &Data),
    ) {
        // Copy under the lock, visit after releasing it.
        let snapshot = self.lock_fresh().copy_range(
            Bound::Included(StorageKey::location_min(*location)),
            Bound::Included(StorageKey::location_max(*location)),
        );
        for (key, data) in &snapshot {
            visitor(key, data);
        }
    }

    fn update_responsibility(&self, key: Id160, peer: Id160) -> bool {
        self.lock_fresh().responsibility.assign(key, peer)
    }

    fn find_responsible_peer(&self, key: &Id160) -> Option<Id160> {
        self.lock_fresh().responsibility.responsible_peer(key)
    }

    fn find_responsible_data(&self, peer: &Id160) -> HashSet<Id160> {
        self.lock_fresh().responsibility.keys_owned_by(peer)
    }

    fn stored_direct_replication(&self) -> Vec<StorageKey> {
        // Nothing survives a restart of an in-memory store.
        Vec::new()
    }

    fn close(&self) {
        self.state.lock().clear();
    }
}
