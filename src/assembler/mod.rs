//! Spot assembler: the per-record state machine
//!
//! The assembler consumes one instrument record at a time and drives the
//! key registry, identity ledger, and fragment staging store. A record
//! either starts a spot (first read of a mate pair, staged until the mate
//! arrives), completes one (mate merge or unmated emission), or updates
//! alignment bookkeeping for an existing spot. After the input stream ends,
//! [`finish`](SpotAssembler::finish) runs the three backfill passes that
//! propagate final spot and alignment ids into the downstream writers.
//!
//! Execution is strictly sequential: one input stream, no concurrent
//! mutation, cancellation polled between records.
//!
//! # Example
//!
//! ```
//! use spotseq::{
//!     MemoryAlignmentSink, MemorySequenceSink, ReadRecordBuilder, SpotAssemblerBuilder,
//! };
//!
//! let mut assembler = SpotAssemblerBuilder::default()
//!     .build(MemorySequenceSink::new(), MemoryAlignmentSink::new());
//!
//! for (name, read_number) in [(&b"RG1:read42/1"[..], 1), (&b"RG1:read42/2"[..], 2)] {
//!     let record = ReadRecordBuilder::default()
//!         .name(name)
//!         .group(b"RG1")
//!         .seq(b"ACGTACGT")
//!         .mated(true)
//!         .read_number(read_number)
//!         .build()
//!         .unwrap();
//!     assembler.push(&record).unwrap();
//! }
//!
//! let summary = assembler.finish(None).unwrap();
//! assert_eq!(summary.spots, 1);
//! ```

mod budget;
mod finalize;

pub use finalize::AssemblySummary;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use budget::ErrorBudget;

use crate::{
    Result,
    config::AssemblerConfig,
    error::AssemblyError,
    ledger::{IdentityLedger, sequence_hash},
    record::{AlignmentRecord, ReadRecord, SpotRead, SpotRecord},
    registry::{CounterStoreFactory, KeyRegistry},
    sink::{AlignmentSink, SequenceSink},
    staging::{FragmentStore, StagedFragment},
};

/// Where a run currently stands
#[derive(Clone, Copy, PartialEq, Eq)]
enum RunState {
    Running,
    Cancelled,
    Failed,
}

/// A builder for creating configured [`SpotAssembler`] instances
///
/// # Example
///
/// ```
/// use spotseq::{
///     MemoryAlignmentSink, MemorySequenceSink, Platform, SpotAssemblerBuilder,
/// };
///
/// let assembler = SpotAssemblerBuilder::default()
///     .platform(Platform::Illumina)
///     .group_platform(b"RG454", Platform::LS454)
///     .error_limit(100, 5.0)
///     .build(MemorySequenceSink::new(), MemoryAlignmentSink::new());
/// ```
#[derive(Default)]
pub struct SpotAssemblerBuilder {
    config: AssemblerConfig,
    store_factory: Option<CounterStoreFactory>,
    cancel: Option<Arc<AtomicBool>>,
}

impl SpotAssemblerBuilder {
    /// Replaces the whole configuration
    #[must_use]
    pub fn config(mut self, config: AssemblerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the platform recorded for read groups without an override
    #[must_use]
    pub fn platform(mut self, platform: crate::Platform) -> Self {
        self.config.default_platform = platform;
        self
    }

    /// Adds a per-read-group platform override
    #[must_use]
    pub fn group_platform(mut self, group: &[u8], platform: crate::Platform) -> Self {
        self.config.group_platforms.insert(group.to_vec(), platform);
        self
    }

    /// Collapses all read groups into a single composite-key partition
    #[must_use]
    pub fn single_partition(mut self, single_partition: bool) -> Self {
        self.config.single_partition = single_partition;
        self
    }

    /// Bounds the number of read-group partitions
    #[must_use]
    pub fn max_partitions(mut self, max_partitions: usize) -> Self {
        self.config.max_partitions = max_partitions;
        self
    }

    /// Enables or disables read-name mate-suffix trimming
    #[must_use]
    pub fn trim_read_suffix(mut self, trim: bool) -> Self {
        self.config.trim_read_suffix = trim;
        self
    }

    /// Sets the data-inconsistency budget (absolute count and percentage)
    #[must_use]
    pub fn error_limit(mut self, max_errors: u64, max_percent: f64) -> Self {
        self.config.max_errors = max_errors;
        self.config.max_error_percent = max_percent;
        self
    }

    /// Sets the distance beyond which a mate's position is backfilled
    #[must_use]
    pub fn mate_distance(mut self, threshold: u64) -> Self {
        self.config.mate_distance_threshold = threshold;
        self
    }

    /// Draws per-partition counter stores from `factory` instead of the
    /// in-memory default
    #[must_use]
    pub fn counter_stores(mut self, factory: CounterStoreFactory) -> Self {
        self.store_factory = Some(factory);
        self
    }

    /// Installs a cooperative-cancellation flag, polled between records
    #[must_use]
    pub fn cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Builds a `SpotAssembler` writing to the given sinks
    pub fn build<S: SequenceSink, A: AlignmentSink>(self, seq: S, align: A) -> SpotAssembler<S, A> {
        let registry = match self.store_factory {
            Some(factory) => KeyRegistry::with_store_factory(&self.config, factory),
            None => KeyRegistry::new(&self.config),
        };
        SpotAssembler {
            registry,
            ledger: IdentityLedger::new(),
            staging: FragmentStore::new(),
            seq,
            align,
            budget: ErrorBudget::new(self.config.max_errors, self.config.max_error_percent),
            cancel: self.cancel,
            config: self.config,
            state: RunState::Running,
            finished: false,
            processed: 0,
            identities: 0,
            spot_count: 0,
            primary_count: 0,
            secondary_count: 0,
            alignment_count: 0,
            solo_flushed: 0,
        }
    }
}

/// The spot assembly engine.
///
/// Owns the key registry, identity ledger, fragment staging store, the two
/// downstream sinks, and all monotonic id counters for the run. Constructed
/// through [`SpotAssemblerBuilder`]; torn down by dropping (or
/// [`into_sinks`](Self::into_sinks) to keep the sinks).
pub struct SpotAssembler<S: SequenceSink, A: AlignmentSink> {
    config: AssemblerConfig,
    registry: KeyRegistry,
    ledger: IdentityLedger,
    staging: FragmentStore,
    seq: S,
    align: A,
    budget: ErrorBudget,
    cancel: Option<Arc<AtomicBool>>,
    state: RunState,
    finished: bool,

    /// Instrument records consumed (also the source read index)
    processed: u64,
    /// Fresh identities created by the registry
    identities: u64,
    /// Last assigned spot id
    spot_count: u64,
    /// Last assigned primary alignment id
    primary_count: u64,
    /// Last assigned secondary alignment id
    secondary_count: u64,
    /// Alignments submitted downstream
    alignment_count: u64,
    /// Spots emitted by the solo-fragment flush
    solo_flushed: u64,
}

impl<S: SequenceSink, A: AlignmentSink> SpotAssembler<S, A> {
    /// Records consumed so far
    #[must_use]
    pub fn records_processed(&self) -> u64 {
        self.processed
    }

    /// Spots emitted so far
    #[must_use]
    pub fn spots_written(&self) -> u64 {
        self.spot_count
    }

    /// Alignments submitted so far
    #[must_use]
    pub fn alignments_written(&self) -> u64 {
        self.alignment_count
    }

    /// The downstream sequence sink
    #[must_use]
    pub fn sequence_sink(&self) -> &S {
        &self.seq
    }

    /// The downstream alignment sink
    #[must_use]
    pub fn alignment_sink(&self) -> &A {
        &self.align
    }

    /// Tears the engine down, handing back the sinks
    #[must_use]
    pub fn into_sinks(self) -> (S, A) {
        (self.seq, self.align)
    }

    /// Consumes one instrument record.
    ///
    /// # Errors
    ///
    /// Fatal conditions (resource exhaustion, partition capacity, an
    /// exhausted error budget, cancellation) abort the run; every later
    /// `push` then fails with [`AssemblyError::Aborted`]. Data
    /// inconsistencies below the budget are logged and absorbed.
    pub fn push(&mut self, record: &ReadRecord<'_>) -> Result<()> {
        match self.state {
            RunState::Running => {}
            RunState::Cancelled => return Err(AssemblyError::Cancelled.into()),
            RunState::Failed => return Err(AssemblyError::Aborted.into()),
        }
        if let Some(cancel) = &self.cancel {
            if cancel.load(Ordering::Relaxed) {
                self.state = RunState::Cancelled;
                log::info!(
                    "ingestion cancelled after {} records; backfill will be skipped",
                    self.processed
                );
                return Err(AssemblyError::Cancelled.into());
            }
        }

        let read_index = self.processed;
        self.processed += 1;

        let result = self.ingest(record, read_index);
        if let Err(err) = &result {
            if !err.is_cancelled() {
                self.state = RunState::Failed;
                log::error!("ingestion aborted at record {read_index}: {err}");
            }
        }
        result
    }

    /// The per-record state machine
    fn ingest(&mut self, record: &ReadRecord<'_>, read_index: u64) -> Result<()> {
        // 1. pairing evidence decides the effective read number
        let mated = record.mated;
        let read_number = if mated { record.read_number } else { 1 };
        let mate = usize::from(read_number - 1);
        let processed = self.processed;

        // 2. resolve the stable identity
        let (key_id, fresh) = self.registry.resolve(record.group, record.name)?;

        // 3. fetch (and maybe initialize) the identity record
        let rec = self.ledger.get_mut(key_id)?;
        if fresh {
            self.identities += 1;
            if !mated {
                rec.set_unmated();
            }
            if record.pcr_duplicate {
                rec.set_pcr_duplicate();
            }
            rec.platform = self.config.platform_of(record.group).code();
        } else {
            // 4. reconcile conflicting evidence for a known identity
            if rec.is_pcr_duplicate() != record.pcr_duplicate {
                log::warn!(
                    "duplicate-flag conflict for key {key_id:#x} at record {read_index}; keeping first-seen value"
                );
                self.budget.charge(processed)?;
            }
            if rec.is_unmated() == mated {
                log::warn!(
                    "mate-pairing conflict for key {key_id:#x} at record {read_index}: record is {}, spot is {}; record rejected",
                    if mated { "mated" } else { "unmated" },
                    if rec.is_unmated() { "unmated" } else { "mated" },
                );
                self.budget.charge(processed)?;
                return Ok(());
            }
        }

        // 5. primary/secondary classification and collision detection
        let hash = sequence_hash(record.seq);
        if rec.hash_recorded(mate) {
            if rec.sequence_hashes[mate] != hash {
                log::warn!(
                    "sequence hash mismatch for key {key_id:#x} read {read_number} at record {read_index}; probable read-name collision"
                );
                self.budget.charge(processed)?;
            }
        } else {
            rec.record_hash(mate, hash);
        }
        let primary = record.aligned && rec.primary_ids[mate] == 0;
        let first_unaligned = !record.aligned && !rec.seen_unaligned(mate);
        if !record.aligned {
            rec.set_seen_unaligned(mate);
        }

        // 6. mate staging and merging
        if mated && (primary || first_unaligned) {
            if !rec.has_staged_read() {
                let fragment = StagedFragment::from_read(record, read_index);
                let mut buf = Vec::with_capacity(fragment.encoded_len());
                fragment.encode(&mut buf)?;
                rec.fragment = self.staging.stash(&buf)?;
                rec.set_staged_read();
            } else if rec.fragment != 0 {
                let staged = StagedFragment::decode(self.staging.read(rec.fragment)?)?;
                if staged.read_number != read_number {
                    // the mate arrived: merge both reads into one spot
                    let spot_id = self.spot_count + 1;
                    let staged_read = SpotRead {
                        seq: &staged.seq,
                        qual: &staged.qual,
                        read_number: staged.read_number,
                        read_index: staged.read_index,
                        aligned: staged.aligned,
                        low_quality: staged.low_quality,
                        reverse: staged.reverse,
                        cs_key: staged.cs_key,
                    };
                    let current_read = SpotRead {
                        seq: record.seq,
                        qual: record.qual,
                        read_number,
                        read_index,
                        aligned: record.aligned,
                        low_quality: record.low_quality,
                        reverse: record.reverse,
                        cs_key: record.cs_key,
                    };
                    let (s_read, x_read) = if staged.read_number < read_number {
                        (staged_read, current_read)
                    } else {
                        (current_read, staged_read)
                    };
                    self.seq.write_spot(&SpotRecord {
                        spot_id,
                        key_id,
                        group: &staged.group,
                        platform: crate::Platform::from_code(rec.platform),
                        pcr_duplicate: rec.is_pcr_duplicate(),
                        s_read,
                        x_read: Some(x_read),
                    })?;
                    self.spot_count = spot_id;
                    rec.spot_id = spot_id;
                    let handle = std::mem::take(&mut rec.fragment);
                    self.staging.free(handle)?;
                }
                // same read number: a repeat occurrence, never re-merged
            }
            // staged flag set with handle 0: the spot is already written
        }

        // 7. unmated spots are emitted immediately
        if !mated && rec.spot_id == 0 {
            let spot_id = self.spot_count + 1;
            self.seq.write_spot(&SpotRecord {
                spot_id,
                key_id,
                group: record.group,
                platform: crate::Platform::from_code(rec.platform),
                pcr_duplicate: rec.is_pcr_duplicate(),
                s_read: SpotRead {
                    seq: record.seq,
                    qual: record.qual,
                    read_number,
                    read_index,
                    aligned: record.aligned,
                    low_quality: record.low_quality,
                    reverse: record.reverse,
                    cs_key: record.cs_key,
                },
                x_read: None,
            })?;
            self.spot_count = spot_id;
            rec.spot_id = spot_id;
        }

        // 8. alignment bookkeeping and submission
        if record.aligned {
            rec.bump_alignment_count(mate);
            self.alignment_count += 1;
            let alignment_id = if primary {
                self.primary_count += 1;
                rec.primary_ids[mate] = self.primary_count;
                self.primary_count
            } else {
                self.secondary_count += 1;
                self.secondary_count
            };
            self.align.accept(&AlignmentRecord {
                key_id,
                alignment_id,
                read_number,
                primary,
                position: record.position,
            })?;
        }

        Ok(())
    }
}
