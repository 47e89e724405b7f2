//! Key registry: (read group, read name) → stable 64-bit identity
//!
//! Every spot identity (`keyId`) is `(partition_index << 32) | counter`,
//! where the partition is selected by the read-group text and the counter is
//! the ordinal of the name's first occurrence within that partition. Keys
//! resolve identically no matter how often or in what order they are seen.
//!
//! Two partitioning modes exist:
//!
//! * **multi-partition** (default): each read group gets its own partition
//!   and counter store, up to [`MAX_PARTITIONS`](crate::MAX_PARTITIONS).
//!   Lookups go through an 8-bit substitution-table hash and a small
//!   most-recently-used cache before falling back to binary search over the
//!   sorted partition index.
//! * **single-partition**: used when read-group cardinality cannot be
//!   bounded in advance. All keys collapse into partition 0 under a
//!   composite `group \t name` key (or the name alone when the group is
//!   empty or already a prefix of the name).

mod cache;
mod partition;

pub use partition::{CounterStoreFactory, KeyCounterStore, MemoryCounterStore};

use cache::{GroupHash, RecencyCache};
use partition::Partition;

use crate::{
    Result,
    config::AssemblerConfig,
    error::RegistryError,
};

/// Bit position of the partition index within a keyId
const PARTITION_SHIFT: u32 = 32;

/// Resolves free-text read names to stable 64-bit spot identities.
///
/// # Example
///
/// ```
/// use spotseq::{AssemblerConfig, KeyRegistry};
///
/// let mut registry = KeyRegistry::new(&AssemblerConfig::default());
/// let (id_a, fresh_a) = registry.resolve(b"RG1", b"read42/1").unwrap();
/// let (id_b, fresh_b) = registry.resolve(b"RG1", b"read42/2").unwrap();
///
/// // both mates canonicalize to the same identity
/// assert_eq!(id_a, id_b);
/// assert!(fresh_a);
/// assert!(!fresh_b);
/// ```
pub struct KeyRegistry {
    hash: GroupHash,
    cache: RecencyCache,
    partitions: Vec<Partition>,
    /// Partition ordinals sorted by group key, for binary search
    sorted: Vec<u32>,
    single_partition: bool,
    max_partitions: usize,
    trim_read_suffix: bool,
    factory: CounterStoreFactory,
    /// Reusable composite-key buffer for single-partition mode
    scratch: Vec<u8>,
}

impl KeyRegistry {
    /// Creates a registry with in-memory counter stores
    #[must_use]
    pub fn new(config: &AssemblerConfig) -> Self {
        Self::with_store_factory(config, Box::new(|| Box::new(MemoryCounterStore::new())))
    }

    /// Creates a registry whose partitions draw their counter stores from
    /// `factory` (e.g. on-disk key indexes)
    #[must_use]
    pub fn with_store_factory(config: &AssemblerConfig, factory: CounterStoreFactory) -> Self {
        Self {
            hash: GroupHash::new(),
            cache: RecencyCache::new(),
            partitions: Vec::new(),
            sorted: Vec::new(),
            single_partition: config.single_partition,
            max_partitions: config.max_partitions.clamp(1, crate::MAX_PARTITIONS),
            trim_read_suffix: config.trim_read_suffix,
            factory,
            scratch: Vec::new(),
        }
    }

    /// Number of partitions allocated so far
    #[must_use]
    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Resolves `(group, name)` to `(key_id, fresh)`.
    ///
    /// `fresh` is true when the name had never been seen in its partition.
    ///
    /// # Errors
    ///
    /// * [`RegistryError::PartitionLimit`] when an unseen group needs a new
    ///   partition past the configured maximum
    /// * [`RegistryError::CounterOverflow`] when a partition exhausts its
    ///   32-bit counter space
    pub fn resolve(&mut self, group: &[u8], name: &[u8]) -> Result<(u64, bool)> {
        let name = if self.trim_read_suffix {
            trim_read_suffix(name)
        } else {
            name
        };

        if self.single_partition {
            return self.resolve_composite(group, name);
        }

        let index = self.find_partition(group)?;
        let (counter, fresh) = self.partitions[index as usize].resolve(name, index)?;
        Ok(((u64::from(index) << PARTITION_SHIFT) | counter, fresh))
    }

    /// Single-partition mode: every key lands in partition 0
    fn resolve_composite(&mut self, group: &[u8], name: &[u8]) -> Result<(u64, bool)> {
        if self.partitions.is_empty() {
            self.partitions
                .push(Partition::new(b"", (self.factory)()));
            self.sorted.push(0);
        }

        // avoid duplicating the group text when names already embed it
        let key: &[u8] = if group.is_empty() || name.starts_with(group) {
            name
        } else {
            self.scratch.clear();
            self.scratch.extend_from_slice(group);
            self.scratch.push(b'\t');
            self.scratch.extend_from_slice(name);
            &self.scratch
        };
        let (counter, fresh) = self.partitions[0].resolve(key, 0)?;
        Ok((counter, fresh))
    }

    /// Finds (or allocates) the partition for `group`
    fn find_partition(&mut self, group: &[u8]) -> Result<u32> {
        let h = self.hash.hash(group);

        // common case: the group was resolved recently
        let hit = self
            .cache
            .candidates(h)
            .iter()
            .enumerate()
            .find(|&(_, &candidate)| self.partitions[candidate as usize].group() == group)
            .map(|(pos, &candidate)| (pos, candidate));
        if let Some((pos, candidate)) = hit {
            self.cache.promote(h, pos);
            return Ok(u32::from(candidate));
        }

        // fall back to the sorted index
        let probe = self
            .sorted
            .binary_search_by(|&i| self.partitions[i as usize].group().cmp(group));
        match probe {
            Ok(pos) => {
                let index = self.sorted[pos];
                self.cache.insert(h, index as u8);
                Ok(index)
            }
            Err(pos) => {
                if self.partitions.len() >= self.max_partitions {
                    return Err(RegistryError::PartitionLimit(self.partitions.len()).into());
                }
                let index = self.partitions.len() as u32;
                self.partitions
                    .push(Partition::new(group, (self.factory)()));
                self.sorted.insert(pos, index);
                self.cache.insert(h, index as u8);
                Ok(index)
            }
        }
    }
}

/// Canonicalizes read names that carry a mate suffix.
///
/// Drops a terminal `#<digit>/` group (with at most one character after the
/// slash) from the `#` onward, and a bare terminal `/<digit>`, so that both
/// mates of the conventional `name#0/1` / `name/2` forms share a key. Never
/// trims a name down to nothing.
fn trim_read_suffix(name: &[u8]) -> &[u8] {
    let n = name.len();

    // "...#0/1" or "...#0/"
    if n >= 4 {
        let lo = n.saturating_sub(4);
        for p in (lo..n - 2).rev() {
            if p > 0
                && name[p] == b'#'
                && name[p + 1].is_ascii_digit()
                && name[p + 2] == b'/'
            {
                return &name[..p];
            }
        }
    }

    // "...read42/1"
    if n > 2 && name[n - 2] == b'/' && name[n - 1].is_ascii_digit() {
        return &name[..n - 2];
    }

    name
}
