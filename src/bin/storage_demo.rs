use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use icn_dht::common::{logging, Id160, LocationDomain, PublicKey, StorageKey};
use icn_dht::config::StorageConfig;
use icn_dht::storage::{spawn_expiration_sweeper, Clock, Data, MemoryStorage, Storage, SystemClock};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = StorageConfig::from_env().context("Failed to load storage configuration")?;
    logging::init_logging(&config.log_level, config.log_dir.as_deref().map(Path::new))?;

    println!("ICN DHT Storage Demo");
    println!("====================\n");

    let storage = Arc::new(MemoryStorage::from_config(&config)?);
    let sweeper = (config.sweep_interval_ms > 0).then(|| {
        spawn_expiration_sweeper(storage.clone(), Duration::from_millis(config.sweep_interval_ms))
    });
    info!(policy = ?storage.policy(), "Storage engine ready");

    let alice = PublicKey::new(b"alice-demo-key".to_vec());
    let bob = PublicKey::new(b"bob-demo-key".to_vec());
    let profile = LocationDomain::new(Id160::hash_of("user:alice"), Id160::hash_of("profile"));
    let name_key = StorageKey::new(profile.location, profile.domain, Id160::hash_of("name"));
    let bio_key = StorageKey::new(profile.location, profile.domain, Id160::hash_of("bio"));

    println!("Claiming {} for alice...", profile);
    let claimed = storage.put(
        name_key,
        Data::new(b"Alice".to_vec()).with_public_key(alice.clone()).protected(true),
        Some(&alice),
        false,
        true,
    );
    println!("  claim accepted: {}", claimed);

    let hijacked = storage.put(bio_key, Data::new(b"spam".to_vec()), Some(&bob), false, false);
    println!("  bob writing into alice's domain accepted: {}", hijacked);

    let now = SystemClock.now_millis();
    let bio = Data::new(b"Short-lived bio".to_vec()).with_ttl(now, Duration::from_millis(200));
    let stored = storage.put(bio_key, bio, Some(&alice), false, false);
    println!("  short-lived bio stored: {}", stored);

    let digest = storage.digest_range(Some(&profile.min()), Some(&profile.max()));
    println!("Digest of {}: {} ({} entries)", profile, digest.hash, digest.size);

    let peer = Id160::hash_of("peer-7");
    let changed = storage.update_responsibility(profile.location, peer);
    println!("Assigned {} to peer {} (changed: {})", profile.location, peer, changed);

    println!("Waiting for the bio to expire...");
    tokio::time::sleep(Duration::from_millis(300)).await;

    let mut exported = 0;
    storage.for_each_under_location(&profile.location, &mut |key, data| {
        exported += 1;
        println!("  {} -> {} bytes", key, data.payload().len());
    });
    println!("Entries left under location: {}", exported);
    println!(
        "Responsible peer after expiry: {:?}",
        storage.find_responsible_peer(&profile.location)
    );

    let metrics = storage.metrics();
    println!("Metrics: {:?}", metrics);

    if let Some(handle) = sweeper {
        handle.abort();
    }
    storage.close();
    Ok(())
}
