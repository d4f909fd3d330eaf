use serde::{Deserialize, Serialize};

/// Counts of storage operations and their outcomes
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct OperationCounts {
    pub puts: u64,
    pub failed_puts: u64,
    pub gets: u64,
    pub removes: u64,
    /// Writes or deletes refused by domain protection or entry ownership
    pub denied_operations: u64,
}

/// Counts from the expiration path
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct EvictionCounts {
    pub evicted_entries: u64,
    /// Scheduled keys that had no stored entry when they came due
    pub anomalies: u64,
}

/// Diagnostics for the storage engine.
///
/// Lives inside the engine state, so every update already happens under the
/// engine lock.
#[derive(Debug, Default)]
pub struct StorageMetrics {
    operation_counts: OperationCounts,
    eviction_counts: EvictionCounts,
}

/// Snapshot of all metrics for a point in time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    pub operation_counts: OperationCounts,
    pub eviction_counts: EvictionCounts,
    pub stored_entries: usize,
    pub domain_claims: usize,
    pub responsibilities: usize,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

impl StorageMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_put(&mut self, stored: bool) {
        if stored {
            self.operation_counts.puts += 1;
        } else {
            self.operation_counts.failed_puts += 1;
        }
    }

    pub fn record_get(&mut self) {
        self.operation_counts.gets += 1;
    }

    pub fn record_removes(&mut self, count: usize) {
        self.operation_counts.removes += count as u64;
    }

    pub fn record_denied(&mut self) {
        self.operation_counts.denied_operations += 1;
    }

    pub fn record_eviction(&mut self) {
        self.eviction_counts.evicted_entries += 1;
    }

    pub fn record_eviction_anomaly(&mut self) {
        self.eviction_counts.anomalies += 1;
    }

    pub fn operation_counts(&self) -> &OperationCounts {
        &self.operation_counts
    }

    pub fn eviction_counts(&self) -> &EvictionCounts {
        &self.eviction_counts
    }
}
