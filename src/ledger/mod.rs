//! Identity ledger: growable out-of-core array of per-identity records
//!
//! The ledger maps every resolved keyId to an [`IdentityRecord`]. Key space
//! is sparse (the partition index sits in the high 32 bits), so records live
//! in fixed-size banks allocated lazily on first touch. Banks are anonymous
//! memory maps: the kernel hands them out zero-filled, which is exactly the
//! "new records start unset" contract, and lets the ledger grow well past
//! resident memory without the process owning the paging policy.
//!
//! There is no per-record delete; the whole ledger is dropped at teardown.

mod record;

pub use record::{
    ALIGNMENT_COUNT_MAX, ALIGNMENT_COUNT_UNTRUSTED, FLAG_HASH_RECORDED_1, FLAG_HASH_RECORDED_2,
    FLAG_PCR_DUPLICATE, FLAG_READ_STAGED, FLAG_UNALIGNED_SEEN_1, FLAG_UNALIGNED_SEEN_2,
    FLAG_UNMATED, IdentityRecord, sequence_hash,
};

use std::collections::HashMap;

use memmap2::MmapMut;

use crate::{
    Result,
    error::LedgerError,
};

/// log2 of records per bank
const BANK_BITS: u32 = 16;

/// Records per bank (64 Ki records, ~2.5 MiB per bank)
const BANK_RECORDS: u64 = 1 << BANK_BITS;

/// One lazily-allocated bank of identity records
struct Bank {
    map: MmapMut,
}
impl Bank {
    fn new() -> std::io::Result<Self> {
        let bytes = (BANK_RECORDS as usize) * std::mem::size_of::<IdentityRecord>();
        let map = MmapMut::map_anon(bytes)?;
        Ok(Self { map })
    }

    fn records(&self) -> &[IdentityRecord] {
        bytemuck::cast_slice(&self.map[..])
    }

    fn records_mut(&mut self) -> &mut [IdentityRecord] {
        bytemuck::cast_slice_mut(&mut self.map[..])
    }
}

/// Growable, index-addressed store of identity records
pub struct IdentityLedger {
    banks: HashMap<u64, Bank>,
}

impl IdentityLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            banks: HashMap::new(),
        }
    }

    /// Number of banks allocated so far
    #[must_use]
    pub fn num_banks(&self) -> usize {
        self.banks.len()
    }

    /// Mutable access to the record for `key_id`, allocating its bank on
    /// first touch.
    ///
    /// A freshly allocated bank is zero-filled, so first access to a new
    /// keyId observes an all-unset record.
    pub fn get_mut(&mut self, key_id: u64) -> Result<&mut IdentityRecord> {
        let bank_no = key_id >> BANK_BITS;
        let slot = (key_id & (BANK_RECORDS - 1)) as usize;
        let bank = match self.banks.entry(bank_no) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => e.insert(Bank::new()?),
        };
        Ok(&mut bank.records_mut()[slot])
    }

    /// Copy of the record for `key_id`, without allocating.
    ///
    /// # Errors
    ///
    /// [`LedgerError::KeyNeverResolved`] when the key's bank was never
    /// touched during ingestion.
    pub fn load(&self, key_id: u64) -> Result<IdentityRecord> {
        let bank_no = key_id >> BANK_BITS;
        let slot = (key_id & (BANK_RECORDS - 1)) as usize;
        let bank = self
            .banks
            .get(&bank_no)
            .ok_or(LedgerError::KeyNeverResolved(key_id))?;
        Ok(bank.records()[slot])
    }

    /// Mutable views of every allocated bank, in ascending key order.
    ///
    /// Each item is `(first_key_of_bank, records)`.
    pub fn banks_mut(&mut self) -> Vec<(u64, &mut [IdentityRecord])> {
        let mut banks: Vec<_> = self
            .banks
            .iter_mut()
            .map(|(&bank_no, bank)| (bank_no << BANK_BITS, bank.records_mut()))
            .collect();
        banks.sort_unstable_by_key(|&(base, _)| base);
        banks
    }
}

impl Default for IdentityLedger {
    fn default() -> Self {
        Self::new()
    }
}
