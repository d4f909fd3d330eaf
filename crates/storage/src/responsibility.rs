use std::collections::{HashMap, HashSet};

use icn_common::Id160;

/// Which peer is responsible for which key, indexed both ways.
///
/// The reverse index never holds an empty set.
#[derive(Debug, Default)]
pub struct ResponsibilityTable {
    by_key: HashMap<Id160, Id160>,
    by_peer: HashMap<Id160, HashSet<Id160>>,
}

impl ResponsibilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `peer` responsible for `key`.
    ///
    /// Returns true if this is the first assignment for `key` or the peer
    /// differs from the previous one.
    pub fn assign(&mut self, key: Id160, peer: Id160) -> bool {
        let previous = self.by_key.insert(key, peer);
        if let Some(old_peer) = previous {
            if old_peer != peer {
                self.unlink(&old_peer, &key);
            }
        }
        self.by_peer.entry(peer).or_default().insert(key);
        previous != Some(peer)
    }

    pub fn responsible_peer(&self, key: &Id160) -> Option<Id160> {
        self.by_key.get(key).copied()
    }

    pub fn keys_owned_by(&self, peer: &Id160) -> HashSet<Id160> {
        self.by_peer.get(peer).cloned().unwrap_or_default()
    }

    /// Forget the assignment for `key`, returning the peer it pointed to
    pub fn remove(&mut self, key: &Id160) -> Option<Id160> {
        let peer = self.by_key.remove(key)?;
        self.unlink(&peer, key);
        Some(peer)
    }

    fn unlink(&mut self, peer: &Id160, key: &Id160) {
        if let Some(keys) = self.by_peer.get_mut(peer) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_peer.remove(peer);
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
        self.by_peer.clear();
    }

    /// Describe the first mismatch between the two indexes, if any
    pub(crate) fn find_inconsistency(&self) -> Option<String> {
        let mut mirrored = 0;
        for (peer, keys) in &self.by_peer {
            if keys.is_empty() {
                return Some(format!("empty responsibility bucket for peer {}", peer));
            }
            for key in keys {
                if self.by_key.get(key) != Some(peer) {
                    return Some(format!(
                        "key {} listed under peer {} but assigned elsewhere",
                        key, peer
                    ));
                }
            }
            mirrored += keys.len();
        }
        if mirrored != self.by_key.len() {
            return Some(format!(
                "{} responsibility facts but {} reverse entries",
                self.by_key.len(),
                mirrored
            ));
        }
        None
    }
}
