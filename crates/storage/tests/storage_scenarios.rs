use std::sync::Arc;
use std::time::Duration;

use icn_common::{Id160, LocationDomain, PublicKey, StorageKey};
use icn_storage::{
    ClaimPurge, Clock, Data, DomainOverride, ManualClock, MemoryStorage, MetricsSnapshot,
    ProtectionPolicy, Storage, SystemClock,
};

const START: u64 = 1_700_000_000_000;

// Helper function to set up an engine driven by a manual clock
fn setup_engine(policy: ProtectionPolicy) -> (MemoryStorage, ManualClock) {
    let clock = ManualClock::new(START);
    let storage = MemoryStorage::with_clock(policy, Arc::new(clock.clone()));
    (storage, clock)
}

fn storage_key(location: &str, domain: &str, content: &str) -> StorageKey {
    StorageKey::new(
        Id160::hash_of(location),
        Id160::hash_of(domain),
        Id160::hash_of(content),
    )
}

#[test]
fn test_claim_then_foreign_overwrite_fails() {
    let (storage, _) = setup_engine(ProtectionPolicy::default());
    let key_a = PublicKey::new(b"alice-public-key".to_vec());
    let key_b = PublicKey::new(b"bob-public-key".to_vec());
    let k1 = storage_key("profile:alice", "contacts", "c1");

    assert!(storage.put(k1, Data::new(b"draft".to_vec()), None, false, false));
    assert_eq!(storage.get(&k1).unwrap().payload(), b"draft");

    let owned = Data::new(b"alice's".to_vec())
        .with_public_key(key_a.clone())
        .protected(true);
    assert!(storage.put(k1, owned, Some(&key_a), false, true));

    let hijack = Data::new(b"bob's".to_vec()).with_public_key(key_b.clone());
    assert!(!storage.put(k1, hijack.clone(), Some(&key_b), false, false));
    assert!(!storage.put(k1, hijack, Some(&key_b), false, true));

    let stored = storage.get(&k1).unwrap();
    assert_eq!(stored.payload(), b"alice's");
    assert_eq!(stored.public_key(), Some(&key_a));
    assert!(stored.is_protected_entry());
    storage.verify_integrity().unwrap();
}

#[test]
fn test_failed_claim_leaves_domain_untouched() {
    let (storage, _) = setup_engine(ProtectionPolicy::default());
    let key_a = PublicKey::new(vec![0xaa; 32]);
    let key_b = PublicKey::new(vec![0xbb; 32]);
    let ld = LocationDomain::new(Id160::hash_of("record"), Id160::hash_of("domain"));

    for n in 0..5u64 {
        let key = StorageKey::new(ld.location, ld.domain, Id160::from_u64(n));
        assert!(storage.put(key, Data::new(vec![n as u8]), Some(&key_a), false, true));
    }
    let before = storage.get_range(Some(&ld.min()), Some(&ld.max())).unwrap();

    let intruder = StorageKey::new(ld.location, ld.domain, Id160::from_u64(99));
    assert!(!storage.put(intruder, Data::new(vec![]), Some(&key_b), false, true));
    assert!(!storage.put(intruder, Data::new(vec![]), Some(&key_b), false, false));
    assert!(storage.remove_range(Some(&ld.min()), None, Some(&key_b)).is_none());
    assert!(storage
        .remove(&StorageKey::new(ld.location, ld.domain, Id160::from_u64(0)), Some(&key_b))
        .is_none());

    let after = storage.get_range(Some(&ld.min()), Some(&ld.max())).unwrap();
    assert_eq!(before, after);
    assert_eq!(storage.domain_owner(&ld), Some(key_a));
}

#[test]
fn test_entry_expires_after_ttl_with_unrelated_traffic() {
    let (storage, clock) = setup_engine(ProtectionPolicy::default());
    let k2 = storage_key("loc", "dom", "k2");
    let k3 = storage_key("loc", "dom", "k3");
    let peer = Id160::hash_of("peer-1");

    let data = Data::new(b"ephemeral".to_vec()).with_ttl(START, Duration::from_millis(100));
    assert!(storage.put(k2, data, None, false, false));
    assert!(storage.update_responsibility(k2.location, peer));
    assert!(storage.get(&k2).is_some());

    clock.advance(Duration::from_millis(150));
    assert!(storage.get(&k3).is_none());

    assert!(storage.get(&k2).is_none());
    assert!(storage
        .get_range(Some(&StorageKey::location_min(k2.location)), None)
        .unwrap()
        .is_empty());
    assert_eq!(storage.digest_keys(&[k2]).size, 0);
    assert_eq!(storage.find_responsible_peer(&k2.location), None);
    assert!(storage.find_responsible_data(&peer).is_empty());
    storage.verify_integrity().unwrap();
}

#[test]
fn test_entry_expires_on_wall_clock() {
    let storage = MemoryStorage::default();
    let key = storage_key("loc", "dom", "wall-clock");
    let now = SystemClock.now_millis();

    let data = Data::new(b"short-lived".to_vec()).with_ttl(now, Duration::from_millis(100));
    assert!(storage.put(key, data, None, false, false));
    assert!(storage.contains(&key));

    std::thread::sleep(Duration::from_millis(150));
    assert!(!storage.contains(&key));
}

#[test]
fn test_cross_domain_range_removal_is_rejected() {
    let (storage, _) = setup_engine(ProtectionPolicy::default());
    let first = storage_key("loc", "domain-1", "a");
    let second = storage_key("loc", "domain-2", "a");
    assert!(storage.put(first, Data::new(vec![1]), None, false, false));
    assert!(storage.put(second, Data::new(vec![2]), None, false, false));

    let (low, high) = if first < second { (first, second) } else { (second, first) };
    assert!(storage.remove_range(Some(&low), Some(&high), None).is_none());
    assert!(storage.contains(&first));
    assert!(storage.contains(&second));
}

#[test]
fn test_master_key_can_clear_foreign_domain() {
    let master = PublicKey::new(b"master".to_vec());
    let owner = PublicKey::new(b"owner".to_vec());
    let policy = ProtectionPolicy::new(DomainOverride::MasterKey(master.clone()), ClaimPurge::Keep);
    let (storage, _) = setup_engine(policy);
    let ld = LocationDomain::new(Id160::hash_of("loc"), Id160::hash_of("dom"));

    for n in 0..3u64 {
        let key = StorageKey::new(ld.location, ld.domain, Id160::from_u64(n));
        assert!(storage.put(key, Data::new(vec![]), Some(&owner), false, true));
    }

    let removed = storage.remove_range(Some(&ld.min()), None, Some(&master)).unwrap();
    assert_eq!(removed.len(), 3);
    assert!(storage.is_empty());
    // removal does not release the claim
    assert_eq!(storage.domain_owner(&ld), Some(owner));
}

#[test]
fn test_bulk_export_under_location() {
    let (storage, clock) = setup_engine(ProtectionPolicy::default());
    let location = Id160::hash_of("exported");
    let mut expected = Vec::new();
    for (domain, content) in [("d1", "c1"), ("d1", "c2"), ("d2", "c1")] {
        let key = StorageKey::new(location, Id160::hash_of(domain), Id160::hash_of(content));
        assert!(storage.put(key, Data::new(content.as_bytes().to_vec()), None, false, false));
        expected.push(key);
    }
    let expiring = StorageKey::new(location, Id160::hash_of("d3"), Id160::hash_of("c1"));
    let data = Data::new(vec![]).with_expiration(START + 1);
    assert!(storage.put(expiring, data, None, false, false));
    assert!(storage.put(storage_key("other", "d1", "c1"), Data::new(vec![]), None, false, false));
    expected.sort();

    clock.advance(Duration::from_millis(1));
    let mut exported = Vec::new();
    storage.for_each_under_location(&location, &mut |key, _| exported.push(*key));
    assert_eq!(exported, expected);
}

#[test]
fn test_metrics_snapshot_serializes() {
    let (storage, _) = setup_engine(ProtectionPolicy::default());
    let key = storage_key("loc", "dom", "c");
    assert!(storage.put(key, Data::new(vec![]), None, false, false));
    storage.get(&key);

    let snapshot = storage.metrics();
    assert_eq!(snapshot.operation_counts.puts, 1);
    assert_eq!(snapshot.operation_counts.gets, 1);
    assert_eq!(snapshot.stored_entries, 1);
    assert_eq!(snapshot.timestamp, START);

    let json = serde_json::to_string(&snapshot).unwrap();
    let back: MetricsSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(back, snapshot);
}
