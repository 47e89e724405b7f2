//! # spotseq
//!
//! A spot assembly and key resolution engine for sequencing read archives.
//!
//! Sequencing instruments emit physical reads; an archive stores *spots* -
//! one fragment or one mate pair, with a single stable identity and any
//! associated alignments. This crate is the streaming join/merge core that
//! turns the former into the latter:
//!
//! * [`KeyRegistry`] resolves `(read group, read name)` pairs to stable
//!   64-bit identities, partitioned by read group;
//! * [`IdentityLedger`] keeps per-identity bookkeeping in a growable
//!   out-of-core array;
//! * [`FragmentStore`] stages the first-seen read of a mate pair until its
//!   mate arrives;
//! * [`SpotAssembler`] drives all three over a single pass of the input and
//!   emits completed spots and alignments through the [`SequenceSink`] and
//!   [`AlignmentSink`] traits;
//! * [`SpotAssembler::finish`] runs the backfill passes that propagate
//!   final spot and alignment ids into the downstream writers.
//!
//! File formats, per-instrument parsers, and the on-disk store
//! implementations live in the driver, not here.
//!
//! ## Example
//!
//! ```
//! use spotseq::{
//!     MemoryAlignmentSink, MemorySequenceSink, Platform, ReadRecordBuilder,
//!     SpotAssemblerBuilder,
//! };
//!
//! let mut assembler = SpotAssemblerBuilder::default()
//!     .platform(Platform::Illumina)
//!     .build(MemorySequenceSink::new(), MemoryAlignmentSink::new());
//!
//! // both mates of one spot, arriving as separate records
//! let mate_1 = ReadRecordBuilder::default()
//!     .name(b"RG1:read42/1")
//!     .group(b"RG1")
//!     .seq(b"ACGTACGT")
//!     .qual(b"IIIIFFFF")
//!     .mated(true)
//!     .read_number(1)
//!     .build()
//!     .unwrap();
//! let mate_2 = ReadRecordBuilder::default()
//!     .name(b"RG1:read42/2")
//!     .group(b"RG1")
//!     .seq(b"TTGGCCAA")
//!     .qual(b"FFFFIIII")
//!     .mated(true)
//!     .read_number(2)
//!     .build()
//!     .unwrap();
//!
//! assembler.push(&mate_1).unwrap();
//! assembler.push(&mate_2).unwrap();
//!
//! let summary = assembler.finish(None).unwrap();
//! assert_eq!(summary.spots, 1);
//! assert_eq!(summary.identities, 1);
//! ```

mod assembler;
mod config;
mod error;
mod ledger;
mod mem;
mod record;
mod registry;
mod sink;
mod staging;

pub use assembler::{AssemblySummary, SpotAssembler, SpotAssemblerBuilder};
pub use config::{
    AssemblerConfig, DEFAULT_MATE_DISTANCE, DEFAULT_MAX_ERROR_PERCENT, DEFAULT_MAX_ERRORS,
    MAX_PARTITIONS, Platform,
};
pub use error::{
    AssemblyError, Error, FinalizeError, IntoSpotseqError, LedgerError, RegistryError, Result,
    StagingError,
};
pub use ledger::{
    ALIGNMENT_COUNT_MAX, ALIGNMENT_COUNT_UNTRUSTED, FLAG_HASH_RECORDED_1, FLAG_HASH_RECORDED_2,
    FLAG_PCR_DUPLICATE, FLAG_READ_STAGED, FLAG_UNALIGNED_SEEN_1, FLAG_UNALIGNED_SEEN_2,
    FLAG_UNMATED, IdentityLedger, IdentityRecord, sequence_hash,
};
pub use mem::{MemoryAlignmentSink, MemorySequenceSink, StoredAlignment, StoredRead, StoredSpot};
pub use record::{
    AlignmentRecord, AlignmentSpotInfo, AlignmentUpdate, ReadRecord, ReadRecordBuilder, SpotRead,
    SpotRecord, SpotUpdate,
};
pub use registry::{CounterStoreFactory, KeyCounterStore, KeyRegistry, MemoryCounterStore};
pub use sink::{AlignmentSink, ReferencePositions, SequenceSink};
pub use staging::{FragmentStore, StagedFragment};
