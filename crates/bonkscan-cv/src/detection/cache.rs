//! Memoized detection results keyed by a cheap screenshot hash

use super::AggregatedDetection;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub type ScreenshotHash = u64;

/// Roughly how many bytes of the encoded screenshot feed the hash.
const HASH_SAMPLES: usize = 100;

/// Non-cryptographic fingerprint of an encoded screenshot.
///
/// Mixes the byte length with bytes sampled at a fixed interval. Two different
/// screenshots of equal length can collide when they agree at every sample.
pub fn screenshot_hash(bytes: &[u8]) -> ScreenshotHash {
    let step = (bytes.len() / HASH_SAMPLES).max(1);
    let mut hash = bytes.len() as u64;
    for &byte in bytes.iter().step_by(step) {
        hash = hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(byte as u64);
    }
    hash
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: Vec<AggregatedDetection>,
    inserted_at: Instant,
    sequence: u64,
}

/// Bounded, time-limited store of final detection results
#[derive(Debug)]
pub struct ResultCache {
    entries: HashMap<ScreenshotHash, CacheEntry>,
    ttl: Duration,
    capacity: usize,
    purge_count: usize,
    next_sequence: u64,
}

impl ResultCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);
    pub const DEFAULT_CAPACITY: usize = 50;
    pub const DEFAULT_PURGE_COUNT: usize = 10;

    pub fn new(ttl: Duration, capacity: usize, purge_count: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            capacity,
            purge_count,
            next_sequence: 0,
        }
    }

    /// Cached result, unless missing or older than the TTL.
    pub fn get(&mut self, hash: ScreenshotHash) -> Option<Vec<AggregatedDetection>> {
        let entry = self.entries.get(&hash)?;
        if entry.inserted_at.elapsed() > self.ttl {
            self.entries.remove(&hash);
            debug!(hash, "cache entry expired");
            return None;
        }
        Some(entry.result.clone())
    }

    /// Store a result, purging the oldest entries once capacity is exceeded.
    pub fn set(&mut self, hash: ScreenshotHash, result: Vec<AggregatedDetection>) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.insert(
            hash,
            CacheEntry {
                result,
                inserted_at: Instant::now(),
                sequence,
            },
        );

        if self.entries.len() > self.capacity {
            self.purge_oldest();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_oldest(&mut self) {
        let mut by_age: Vec<(Instant, u64, ScreenshotHash)> = self
            .entries
            .iter()
            .map(|(hash, entry)| (entry.inserted_at, entry.sequence, *hash))
            .collect();
        by_age.sort_unstable();

        for (_, _, hash) in by_age.into_iter().take(self.purge_count) {
            self.entries.remove(&hash);
        }
        debug!(remaining = self.entries.len(), "cache purged");
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL, Self::DEFAULT_CAPACITY, Self::DEFAULT_PURGE_COUNT)
    }
}
