//! Read-group hashing and the partition recency cache
//!
//! Repeated records overwhelmingly share a read group with their neighbors,
//! so the registry keeps a tiny most-recently-used cache in front of the
//! sorted partition index. The cache is advisory: every candidate it returns
//! is validated against the partition's actual group key before use.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Seed for the substitution-table shuffle
///
/// Fixed so that hashing is reproducible across runs of the program.
pub const TABLE_SEED: u64 = 42;

/// Number of cache buckets, equal to the size of the 8-bit hash range
const NUM_BUCKETS: usize = 256;

/// Partition indices remembered per bucket
const BUCKET_WAYS: usize = 3;

/// A byte-wise substitution-table hash over read-group keys.
///
/// Pearson-style: one table lookup per input byte, 8-bit output. Not
/// cryptographic; collisions are expected and tolerated since the hash only
/// selects a cache bucket.
pub struct GroupHash {
    table: [u8; NUM_BUCKETS],
}
impl GroupHash {
    #[must_use]
    pub fn new() -> Self {
        let mut table = [0u8; NUM_BUCKETS];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = i as u8;
        }
        let mut rng = SmallRng::seed_from_u64(TABLE_SEED);
        for i in (1..NUM_BUCKETS).rev() {
            let j = rng.random_range(0..=i);
            table.swap(i, j);
        }
        Self { table }
    }

    /// Hashes `key` into the bucket range
    #[inline]
    #[must_use]
    pub fn hash(&self, key: &[u8]) -> u8 {
        let mut h = self.table[key.len() & 0xFF];
        for &b in key {
            h = self.table[(h ^ b) as usize];
        }
        h
    }
}
impl Default for GroupHash {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-bucket MRU list of partition indices
#[derive(Clone, Copy, Default)]
struct Bucket {
    /// Partition indices, most recent first
    slots: [u8; BUCKET_WAYS],
    /// Saturating occupancy (0..=3)
    len: u8,
}

/// A fixed-size cache mapping hashed read-group keys to the partitions they
/// most recently resolved to.
///
/// Policy: on hit, promote the entry to most-recent; on miss with room,
/// insert; on miss at capacity, evict the least-recently-used entry.
pub struct RecencyCache {
    buckets: Vec<Bucket>,
}
impl RecencyCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: vec![Bucket::default(); NUM_BUCKETS],
        }
    }

    /// Returns the cached partition indices for `hash`, most recent first
    #[inline]
    #[must_use]
    pub fn candidates(&self, hash: u8) -> &[u8] {
        let bucket = &self.buckets[hash as usize];
        &bucket.slots[..bucket.len as usize]
    }

    /// Promotes the candidate at `pos` (as returned by [`candidates`](Self::candidates))
    /// to most-recent
    pub fn promote(&mut self, hash: u8, pos: usize) {
        let bucket = &mut self.buckets[hash as usize];
        debug_assert!(pos < bucket.len as usize);
        bucket.slots[..=pos].rotate_right(1);
    }

    /// Records `partition` as the most-recent resolution for `hash`,
    /// evicting the least-recently-used entry when the bucket is full
    pub fn insert(&mut self, hash: u8, partition: u8) {
        let bucket = &mut self.buckets[hash as usize];
        if bucket.len < BUCKET_WAYS as u8 {
            bucket.len += 1;
        }
        let occupied = bucket.len as usize;
        bucket.slots[..occupied].rotate_right(1);
        bucket.slots[0] = partition;
    }
}
impl Default for RecencyCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        let a = GroupHash::new();
        let b = GroupHash::new();
        for key in [&b"RG1"[..], b"RG2", b"", b"a much longer group name"] {
            assert_eq!(a.hash(key), b.hash(key));
        }
    }

    #[test]
    fn test_hash_spreads_similar_keys() {
        let h = GroupHash::new();
        // adjacent group names should not all collapse into one bucket
        let buckets: std::collections::HashSet<u8> =
            (0..32u8).map(|i| h.hash(format!("RG{i}").as_bytes())).collect();
        assert!(buckets.len() > 8);
    }

    #[test]
    fn test_insert_and_promote() {
        let mut cache = RecencyCache::new();
        cache.insert(7, 1);
        cache.insert(7, 2);
        cache.insert(7, 3);
        assert_eq!(cache.candidates(7), &[3, 2, 1]);

        // hit on the last entry moves it to the front
        cache.promote(7, 2);
        assert_eq!(cache.candidates(7), &[1, 3, 2]);

        // promoting the front is a no-op
        cache.promote(7, 0);
        assert_eq!(cache.candidates(7), &[1, 3, 2]);
    }

    #[test]
    fn test_eviction_drops_least_recent() {
        let mut cache = RecencyCache::new();
        cache.insert(0, 1);
        cache.insert(0, 2);
        cache.insert(0, 3);
        cache.insert(0, 4);
        assert_eq!(cache.candidates(0), &[4, 3, 2]);
    }

    #[test]
    fn test_buckets_are_independent() {
        let mut cache = RecencyCache::new();
        cache.insert(1, 10);
        cache.insert(2, 20);
        assert_eq!(cache.candidates(1), &[10]);
        assert_eq!(cache.candidates(2), &[20]);
        assert!(cache.candidates(3).is_empty());
    }
}
