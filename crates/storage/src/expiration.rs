use std::collections::{BTreeMap, HashMap, HashSet};

use icn_common::StorageKey;

/// Expiration time of every stored key, indexed both ways so expired keys
/// can be found without scanning the whole store.
///
/// Each key has at most one scheduled time and the time index never holds
/// an empty set.
#[derive(Debug, Default)]
pub struct ExpirationSchedule {
    by_key: HashMap<StorageKey, u64>,
    by_time: BTreeMap<u64, HashSet<StorageKey>>,
}

impl ExpirationSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `key` to expire at `expires_at`, replacing any earlier schedule
    pub fn schedule(&mut self, key: StorageKey, expires_at: u64) {
        if let Some(previous) = self.by_key.insert(key, expires_at) {
            if previous != expires_at {
                self.unlink(previous, &key);
            }
        }
        self.by_time.entry(expires_at).or_default().insert(key);
    }

    /// Drop the schedule for `key`, returning the time it was due
    pub fn unschedule(&mut self, key: &StorageKey) -> Option<u64> {
        let expires_at = self.by_key.remove(key)?;
        self.unlink(expires_at, key);
        Some(expires_at)
    }

    pub fn expiration_of(&self, key: &StorageKey) -> Option<u64> {
        self.by_key.get(key).copied()
    }

    /// Remove and return every key due at or before `now`
    pub fn take_expired(&mut self, now: u64) -> Vec<StorageKey> {
        let due: Vec<u64> = self.by_time.range(..=now).map(|(t, _)| *t).collect();
        let mut expired = Vec::new();
        for time in due {
            if let Some(keys) = self.by_time.remove(&time) {
                for key in keys {
                    self.by_key.remove(&key);
                    expired.push(key);
                }
            }
        }
        expired
    }

    fn unlink(&mut self, expires_at: u64, key: &StorageKey) {
        if let Some(keys) = self.by_time.get_mut(&expires_at) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_time.remove(&expires_at);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_key.clear();
        self.by_time.clear();
    }

    /// Describe the first mismatch between the two indexes, if any
    pub(crate) fn find_inconsistency(&self) -> Option<String> {
        let mut mirrored = 0;
        for (time, keys) in &self.by_time {
            if keys.is_empty() {
                return Some(format!("empty expiration bucket at {}", time));
            }
            for key in keys {
                if self.by_key.get(key) != Some(time) {
                    return Some(format!("key {} listed at {} but scheduled elsewhere", key, time));
                }
            }
            mirrored += keys.len();
        }
        if mirrored != self.by_key.len() {
            return Some(format!(
                "{} expiration facts but {} reverse entries",
                self.by_key.len(),
                mirrored
            ));
        }
        None
    }
}
