//! Post-ingestion backfill passes
//!
//! Three sequential passes run once the input stream is exhausted:
//!
//! 1. **Solo fragment flush** - staged reads whose mate never arrived are
//!    emitted as single-read spots.
//! 2. **Alignment spot-info update** - every written alignment learns its
//!    final spot id, its mate's primary alignment id, and (for distant
//!    mates) the mate's resolved reference position.
//! 3. **Sequence update** - every written spot learns its final primary
//!    alignment ids and saturating alignment counts; any divergence between
//!    the ledger and the sequence writer here is structural corruption and
//!    aborts finalization.

use super::{RunState, SpotAssembler};

use crate::{
    Result,
    error::FinalizeError,
    record::{AlignmentUpdate, SpotRead, SpotRecord, SpotUpdate},
    sink::{AlignmentSink, ReferencePositions, SequenceSink},
    staging::StagedFragment,
};

/// Outcome counters for a completed (or cancelled) run
#[derive(Clone, Copy, Debug, Default)]
pub struct AssemblySummary {
    /// Instrument records consumed
    pub records: u64,
    /// Distinct identities resolved
    pub identities: u64,
    /// Spots written, including solo-flushed fragments
    pub spots: u64,
    /// Spots emitted by the solo-fragment flush
    pub solo_flushed: u64,
    /// Alignment records submitted downstream
    pub alignments: u64,
    /// Primary alignment ids assigned
    pub primary: u64,
    /// Secondary alignment ids assigned
    pub secondary: u64,
    /// Data-inconsistency events absorbed by the error budget
    pub inconsistencies: u64,
    /// False when the run was cancelled and backfill was skipped
    pub complete: bool,
}

impl<S: SequenceSink, A: AlignmentSink> SpotAssembler<S, A> {
    /// Finalizes the run: flushes unmatched fragments and backfills the
    /// downstream writers.
    ///
    /// `positions` supplies global reference coordinates for distant-mate
    /// resolution; passing `None` leaves mate positions unresolved.
    ///
    /// After a cooperative cancellation the passes are skipped and the
    /// summary reports `complete: false`; after a fatal ingestion error this
    /// returns [`FinalizeError::IngestionAborted`].
    pub fn finish(
        &mut self,
        positions: Option<&dyn ReferencePositions>,
    ) -> Result<AssemblySummary> {
        match self.state {
            RunState::Failed => return Err(FinalizeError::IngestionAborted.into()),
            RunState::Cancelled => {
                log::warn!(
                    "ingestion was cancelled after {} records; skipping backfill passes",
                    self.processed
                );
                return Ok(self.summary(false));
            }
            RunState::Running => {}
        }

        if !self.finished {
            let result = self.run_passes(positions);
            if result.is_err() {
                self.state = RunState::Failed;
                return result.map(|()| self.summary(false));
            }
            self.finished = true;
            log::info!(
                "assembled {} spots from {} records ({} solo-flushed, {} alignments)",
                self.spot_count,
                self.processed,
                self.solo_flushed,
                self.alignment_count,
            );
        }
        Ok(self.summary(true))
    }

    fn run_passes(&mut self, positions: Option<&dyn ReferencePositions>) -> Result<()> {
        self.flush_solo_fragments()?;
        self.update_alignments(positions)?;
        self.update_sequences()
    }

    fn summary(&self, complete: bool) -> AssemblySummary {
        AssemblySummary {
            records: self.processed,
            identities: self.identities,
            spots: self.spot_count,
            solo_flushed: self.solo_flushed,
            alignments: self.alignment_count,
            primary: self.primary_count,
            secondary: self.secondary_count,
            inconsistencies: self.budget.errors(),
            complete,
        }
    }

    /// Pass 1: emit staged-but-unmated fragments as solo spots
    fn flush_solo_fragments(&mut self) -> Result<()> {
        for (base, records) in self.ledger.banks_mut() {
            for (slot, rec) in records.iter_mut().enumerate() {
                if rec.fragment == 0 {
                    continue;
                }
                let key_id = base + slot as u64;
                let staged = StagedFragment::decode(self.staging.read(rec.fragment)?)?;
                let spot_id = self.spot_count + 1;
                self.seq.write_spot(&SpotRecord {
                    spot_id,
                    key_id,
                    group: &staged.group,
                    platform: crate::Platform::from_code(rec.platform),
                    pcr_duplicate: rec.is_pcr_duplicate(),
                    s_read: SpotRead {
                        seq: &staged.seq,
                        qual: &staged.qual,
                        read_number: staged.read_number,
                        read_index: staged.read_index,
                        aligned: staged.aligned,
                        low_quality: staged.low_quality,
                        reverse: staged.reverse,
                        cs_key: staged.cs_key,
                    },
                    x_read: None,
                })?;
                self.spot_count = spot_id;
                rec.spot_id = spot_id;
                let handle = std::mem::take(&mut rec.fragment);
                self.staging.free(handle)?;
                self.solo_flushed += 1;
            }
        }
        Ok(())
    }

    /// Pass 2: push final spot ids and mate info into the alignment writer
    fn update_alignments(&mut self, positions: Option<&dyn ReferencePositions>) -> Result<()> {
        let mut warned_no_positions = false;
        for row in 0..self.align.len() {
            let info = self.align.spot_info(row)?;
            let rec = self.ledger.load(info.key_id)?;
            if rec.spot_id == 0 {
                log::warn!(
                    "alignment {} (key {:#x}) belongs to a spot that was never assembled",
                    info.alignment_id,
                    info.key_id,
                );
            }

            let mate = usize::from(info.read_number - 1);
            let other = 1 - mate;
            let mut update = AlignmentUpdate {
                spot_id: rec.spot_id,
                mate_alignment_id: 0,
                mate_position: None,
            };
            if info.primary && rec.primary_ids[other] != 0 {
                update.mate_alignment_id = rec.primary_ids[other];
                match positions {
                    Some(source) => {
                        let mate_position = source.global_position(update.mate_alignment_id)?;
                        if mate_position.abs_diff(info.position)
                            > self.config.mate_distance_threshold
                        {
                            update.mate_position = Some(mate_position);
                        }
                    }
                    None => {
                        if !warned_no_positions {
                            log::warn!(
                                "no reference-position source; distant-mate positions left unresolved"
                            );
                            warned_no_positions = true;
                        }
                    }
                }
            }
            self.align.update_alignment(row, &update)?;
        }
        Ok(())
    }

    /// Pass 3: push final alignment data into the sequence writer
    fn update_sequences(&mut self) -> Result<()> {
        for spot_id in 1..=self.spot_count {
            let key_id = self.seq.key_of(spot_id)?;
            let rec = self.ledger.load(key_id)?;
            if rec.spot_id != spot_id {
                return Err(FinalizeError::SpotIdMismatch {
                    spot_id,
                    stored: rec.spot_id,
                    key_id,
                }
                .into());
            }
            self.seq.update_spot(
                spot_id,
                &SpotUpdate {
                    primary_ids: rec.primary_ids,
                    alignment_counts: rec.alignment_counts,
                },
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::{
        Error,
        assembler::SpotAssemblerBuilder,
        error::AssemblyError,
        ledger::ALIGNMENT_COUNT_MAX,
        mem::{MemoryAlignmentSink, MemorySequenceSink},
        record::{ReadRecord, ReadRecordBuilder},
    };

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn assembler() -> SpotAssembler<MemorySequenceSink, MemoryAlignmentSink> {
        SpotAssemblerBuilder::default()
            .build(MemorySequenceSink::new(), MemoryAlignmentSink::new())
    }

    fn mate<'a>(name: &'a [u8], read_number: u8, seq: &'a [u8]) -> ReadRecord<'a> {
        ReadRecordBuilder::default()
            .name(name)
            .group(b"RG1")
            .seq(seq)
            .mated(true)
            .read_number(read_number)
            .build()
            .unwrap()
    }

    #[test]
    fn test_mate_merge_is_idempotent() -> Result<()> {
        init_logging();
        let mut asm = assembler();
        asm.push(&mate(b"RG1:read42/1", 1, b"ACGTACGT"))?;
        asm.push(&mate(b"RG1:read42/2", 2, b"TTGGCCAA"))?;
        // duplicate occurrences of both mates
        asm.push(&mate(b"RG1:read42/1", 1, b"ACGTACGT"))?;
        asm.push(&mate(b"RG1:read42/2", 2, b"TTGGCCAA"))?;

        let summary = asm.finish(None)?;
        assert_eq!(summary.spots, 1);
        assert_eq!(summary.solo_flushed, 0);
        assert_eq!(summary.identities, 1);

        let spots = asm.sequence_sink().spots();
        assert_eq!(spots.len(), 1);
        assert_eq!(spots[0].reads.len(), 2);
        // reads ordered by read number regardless of arrival
        assert_eq!(spots[0].reads[0].read_number, 1);
        assert_eq!(spots[0].reads[0].seq, b"ACGTACGT");
        assert_eq!(spots[0].reads[1].read_number, 2);
        assert_eq!(spots[0].reads[1].seq, b"TTGGCCAA");
        Ok(())
    }

    #[test]
    fn test_reverse_arrival_order_still_orders_reads() -> Result<()> {
        let mut asm = assembler();
        asm.push(&mate(b"r9/2", 2, b"TTTT"))?;
        asm.push(&mate(b"r9/1", 1, b"AAAA"))?;
        asm.finish(None)?;

        let spots = asm.sequence_sink().spots();
        assert_eq!(spots[0].reads[0].seq, b"AAAA");
        assert_eq!(spots[0].reads[1].seq, b"TTTT");
        Ok(())
    }

    #[test]
    fn test_unmatched_mate_is_flushed_once() -> Result<()> {
        init_logging();
        let mut asm = assembler();
        asm.push(&mate(b"lonely/1", 1, b"ACGT"))?;

        let summary = asm.finish(None)?;
        assert_eq!(summary.spots, 1);
        assert_eq!(summary.solo_flushed, 1);

        let spots = asm.sequence_sink().spots();
        assert_eq!(spots.len(), 1);
        assert_eq!(spots[0].spot_id, 1);
        assert_eq!(spots[0].reads.len(), 1);
        assert_eq!(spots[0].reads[0].read_number, 1);
        assert_eq!(spots[0].group, b"RG1");
        Ok(())
    }

    #[test]
    fn test_spot_ids_are_contiguous() -> Result<()> {
        let mut asm = assembler();
        // merged pair, two unmated reads, one orphan mate
        asm.push(&mate(b"p1/1", 1, b"AAAA"))?;
        asm.push(&mate(b"p1/2", 2, b"CCCC"))?;
        for name in [&b"solo_a"[..], b"solo_b"] {
            let record = ReadRecordBuilder::default()
                .name(name)
                .group(b"RG1")
                .seq(b"GGGG")
                .build()
                .unwrap();
            asm.push(&record)?;
        }
        asm.push(&mate(b"orphan/1", 1, b"TTTT"))?;

        let summary = asm.finish(None)?;
        assert_eq!(summary.spots, 4);
        assert_eq!(summary.solo_flushed, 1);

        let mut ids: Vec<u64> = asm
            .sequence_sink()
            .spots()
            .iter()
            .map(|spot| spot.spot_id)
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        Ok(())
    }

    #[test]
    fn test_unmated_duplicate_emits_once() -> Result<()> {
        let mut asm = assembler();
        let record = ReadRecordBuilder::default()
            .name(b"frag")
            .group(b"RG1")
            .seq(b"ACGT")
            .build()
            .unwrap();
        asm.push(&record)?;
        asm.push(&record)?;

        let summary = asm.finish(None)?;
        assert_eq!(summary.spots, 1);
        assert_eq!(summary.records, 2);
        Ok(())
    }

    #[test]
    fn test_first_aligned_occurrence_wins_primary() -> Result<()> {
        init_logging();
        let mut asm = assembler();

        // the RG1/read42 scenario: mate 1 aligned twice, mate 2 unaligned
        let aligned = |name: &'static [u8], position: u64| {
            ReadRecordBuilder::default()
                .name(name)
                .group(b"RG1")
                .seq(b"ACGTACGT")
                .mated(true)
                .read_number(1)
                .aligned(true)
                .position(position)
                .build()
                .unwrap()
        };
        asm.push(&aligned(b"RG1:read42/1", 100))?;
        asm.push(&mate(b"RG1:read42/2", 2, b"TTGGCCAA"))?;
        asm.push(&aligned(b"RG1:read42/1", 900))?;

        let summary = asm.finish(None)?;
        assert_eq!(summary.spots, 1);
        assert_eq!(summary.primary, 1);
        assert_eq!(summary.secondary, 1);

        let rows = asm.alignment_sink().rows();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].record.primary);
        assert!(!rows[1].record.primary);

        // pass 3 reproduces the primary id and count
        let update = asm.sequence_sink().spots()[0].update.unwrap();
        assert_eq!(update.primary_ids, [1, 0]);
        assert_eq!(update.alignment_counts, [2, 0]);
        Ok(())
    }

    #[test]
    fn test_alignment_counts_saturate() -> Result<()> {
        let mut asm = assembler();
        for i in 0..300u32 {
            let record = ReadRecordBuilder::default()
                .name(b"busy")
                .group(b"RG1")
                .seq(b"ACGT")
                .aligned(true)
                .position(u64::from(i))
                .build()
                .unwrap();
            asm.push(&record)?;
        }

        let summary = asm.finish(None)?;
        assert_eq!(summary.alignments, 300);
        assert_eq!(summary.primary, 1);
        assert_eq!(summary.secondary, 299);

        let update = asm.sequence_sink().spots()[0].update.unwrap();
        assert_eq!(update.alignment_counts[0], ALIGNMENT_COUNT_MAX);
        Ok(())
    }

    #[test]
    fn test_alignment_backfill_resolves_distant_mates() -> Result<()> {
        init_logging();
        let mut asm = assembler();

        let paired_aligned = |name: &'static [u8], read_number: u8, position: u64| {
            ReadRecordBuilder::default()
                .name(name)
                .group(b"RG1")
                .seq(b"ACGTACGT")
                .mated(true)
                .read_number(read_number)
                .aligned(true)
                .position(position)
                .build()
                .unwrap()
        };
        // distant pair
        asm.push(&paired_aligned(b"far/1", 1, 1_000))?;
        asm.push(&paired_aligned(b"far/2", 2, 500_000))?;
        // nearby pair
        asm.push(&paired_aligned(b"near/1", 1, 2_000))?;
        asm.push(&paired_aligned(b"near/2", 2, 3_000))?;

        // the memory alignment sink doubles as the position source
        let positions = {
            let mut source = MemoryAlignmentSink::new();
            for row in asm.alignment_sink().rows() {
                source.accept(&row.record)?;
            }
            source
        };
        asm.finish(Some(&positions))?;

        let rows = asm.alignment_sink().rows();
        let far_1 = rows[0].update.unwrap();
        assert_eq!(far_1.spot_id, 1);
        assert_eq!(far_1.mate_alignment_id, 2);
        assert_eq!(far_1.mate_position, Some(500_000));

        let far_2 = rows[1].update.unwrap();
        assert_eq!(far_2.mate_alignment_id, 1);
        assert_eq!(far_2.mate_position, Some(1_000));

        // nearby mates stay unresolved
        let near_1 = rows[2].update.unwrap();
        assert_eq!(near_1.spot_id, 2);
        assert_eq!(near_1.mate_alignment_id, 4);
        assert_eq!(near_1.mate_position, None);
        Ok(())
    }

    #[test]
    fn test_error_budget_aborts_on_excess() {
        init_logging();
        let mut asm = SpotAssemblerBuilder::default()
            .error_limit(2, 100.0)
            .build(MemorySequenceSink::new(), MemoryAlignmentSink::new());

        // establish an unmated identity, then submit mated conflicts
        let solo = ReadRecordBuilder::default()
            .name(b"flip")
            .group(b"RG1")
            .seq(b"ACGT")
            .build()
            .unwrap();
        asm.push(&solo).unwrap();

        let conflicting = mate(b"flip", 1, b"ACGT");
        asm.push(&conflicting).unwrap();
        asm.push(&conflicting).unwrap();
        let err = asm.push(&conflicting).unwrap_err();
        assert!(err.is_excessive_errors());

        // the assembler is poisoned from here on
        let err = asm.push(&solo).unwrap_err();
        assert!(matches!(
            err,
            Error::AssemblyError(AssemblyError::Aborted)
        ));
        assert!(matches!(
            asm.finish(None),
            Err(Error::FinalizeError(FinalizeError::IngestionAborted))
        ));
    }

    #[test]
    fn test_duplicate_flag_conflict_keeps_first_value() -> Result<()> {
        init_logging();
        let mut asm = assembler();
        let record = ReadRecordBuilder::default()
            .name(b"dup")
            .group(b"RG1")
            .seq(b"ACGT")
            .pcr_duplicate(true)
            .build()
            .unwrap();
        asm.push(&record)?;

        let conflicting = ReadRecordBuilder::default()
            .name(b"dup")
            .group(b"RG1")
            .seq(b"ACGT")
            .build()
            .unwrap();
        asm.push(&conflicting)?;

        let summary = asm.finish(None)?;
        assert_eq!(summary.inconsistencies, 1);
        assert!(asm.sequence_sink().spots()[0].pcr_duplicate);
        Ok(())
    }

    #[test]
    fn test_cancellation_skips_backfill() -> Result<()> {
        init_logging();
        let cancel = Arc::new(AtomicBool::new(false));
        let mut asm = SpotAssemblerBuilder::default()
            .cancel_flag(Arc::clone(&cancel))
            .build(MemorySequenceSink::new(), MemoryAlignmentSink::new());

        asm.push(&mate(b"pending/1", 1, b"ACGT"))?;
        cancel.store(true, Ordering::Relaxed);

        let err = asm.push(&mate(b"pending/2", 2, b"TTTT")).unwrap_err();
        assert!(err.is_cancelled());

        let summary = asm.finish(None)?;
        assert!(!summary.complete);
        // the staged fragment was not flushed
        assert_eq!(summary.spots, 0);
        assert!(asm.sequence_sink().spots().is_empty());
        Ok(())
    }

    #[test]
    fn test_spot_id_divergence_is_fatal() {
        /// A sequence sink whose key index lies about one spot
        struct CorruptSink {
            inner: MemorySequenceSink,
        }
        impl SequenceSink for CorruptSink {
            fn write_spot(&mut self, spot: &SpotRecord<'_>) -> Result<()> {
                self.inner.write_spot(spot)
            }
            fn key_of(&self, spot_id: u64) -> Result<u64> {
                // report a key that resolves to a different spot
                self.inner.key_of(spot_id).map(|key| key ^ 1)
            }
            fn update_spot(&mut self, spot_id: u64, update: &SpotUpdate) -> Result<()> {
                self.inner.update_spot(spot_id, update)
            }
        }

        let mut asm = SpotAssemblerBuilder::default().build(
            CorruptSink {
                inner: MemorySequenceSink::new(),
            },
            MemoryAlignmentSink::new(),
        );

        for name in [&b"a"[..], b"b"] {
            let record = ReadRecordBuilder::default()
                .name(name)
                .group(b"RG1")
                .seq(b"ACGT")
                .build()
                .unwrap();
            asm.push(&record).unwrap();
        }

        let err = asm.finish(None).unwrap_err();
        assert!(matches!(
            err,
            Error::FinalizeError(FinalizeError::SpotIdMismatch { .. })
        ));
    }

    #[test]
    fn test_sequence_hash_mismatch_is_charged_not_fatal() -> Result<()> {
        init_logging();
        let mut asm = assembler();
        let record = ReadRecordBuilder::default()
            .name(b"twin")
            .group(b"RG1")
            .seq(b"ACGTACGT")
            .build()
            .unwrap();
        asm.push(&record)?;

        // same name, different sequence: a probable identity collision
        let collider = ReadRecordBuilder::default()
            .name(b"twin")
            .group(b"RG1")
            .seq(b"GGGGGGGG")
            .build()
            .unwrap();
        asm.push(&collider)?;

        let summary = asm.finish(None)?;
        assert_eq!(summary.inconsistencies, 1);
        assert_eq!(summary.spots, 1);
        Ok(())
    }

    #[test]
    fn test_finish_is_idempotent() -> Result<()> {
        let mut asm = assembler();
        asm.push(&mate(b"p/1", 1, b"ACGT"))?;
        let first = asm.finish(None)?;
        let second = asm.finish(None)?;
        assert_eq!(first.spots, second.spots);
        assert_eq!(asm.sequence_sink().spots().len(), 1);
        Ok(())
    }
}
