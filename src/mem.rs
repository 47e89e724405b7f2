//! In-memory sink implementations
//!
//! Reference collaborators for the sink traits: they keep everything in
//! `Vec`s, which is what tests and small drivers want, and they document the
//! bookkeeping a real columnar writer must do (key index per spot, row
//! addressing per alignment, position lookup for primaries).

use std::collections::HashMap;

use crate::{
    Result,
    config::Platform,
    error::FinalizeError,
    record::{AlignmentRecord, AlignmentSpotInfo, AlignmentUpdate, SpotRecord, SpotUpdate},
    sink::{AlignmentSink, ReferencePositions, SequenceSink},
};

/// An owned copy of one read of a stored spot
#[derive(Clone, Debug)]
pub struct StoredRead {
    pub seq: Vec<u8>,
    pub qual: Vec<u8>,
    pub read_number: u8,
    pub read_index: u64,
    pub aligned: bool,
    pub low_quality: bool,
    pub reverse: bool,
    pub cs_key: u8,
}

/// An owned copy of a stored spot record, plus its backfill update
#[derive(Clone, Debug)]
pub struct StoredSpot {
    pub spot_id: u64,
    pub key_id: u64,
    pub group: Vec<u8>,
    pub platform: Platform,
    pub pcr_duplicate: bool,
    pub reads: Vec<StoredRead>,
    pub update: Option<SpotUpdate>,
}

/// Sequence sink that buffers spots in memory
#[derive(Default)]
pub struct MemorySequenceSink {
    spots: Vec<StoredSpot>,
}
impl MemorySequenceSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored spots in spot-id order
    #[must_use]
    pub fn spots(&self) -> &[StoredSpot] {
        &self.spots
    }
}
impl SequenceSink for MemorySequenceSink {
    fn write_spot(&mut self, spot: &SpotRecord<'_>) -> Result<()> {
        let mut reads = Vec::with_capacity(spot.num_reads());
        for read in std::iter::once(&spot.s_read).chain(spot.x_read.as_ref()) {
            reads.push(StoredRead {
                seq: read.seq.to_vec(),
                qual: read.qual.to_vec(),
                read_number: read.read_number,
                read_index: read.read_index,
                aligned: read.aligned,
                low_quality: read.low_quality,
                reverse: read.reverse,
                cs_key: read.cs_key,
            });
        }
        self.spots.push(StoredSpot {
            spot_id: spot.spot_id,
            key_id: spot.key_id,
            group: spot.group.to_vec(),
            platform: spot.platform,
            pcr_duplicate: spot.pcr_duplicate,
            reads,
            update: None,
        });
        Ok(())
    }

    fn key_of(&self, spot_id: u64) -> Result<u64> {
        self.spot(spot_id).map(|spot| spot.key_id)
    }

    fn update_spot(&mut self, spot_id: u64, update: &SpotUpdate) -> Result<()> {
        let index = self.index_of(spot_id)?;
        self.spots[index].update = Some(*update);
        Ok(())
    }
}
impl MemorySequenceSink {
    fn index_of(&self, spot_id: u64) -> Result<usize> {
        let index = spot_id
            .checked_sub(1)
            .ok_or(FinalizeError::UnknownSpot(spot_id))? as usize;
        if index >= self.spots.len() {
            return Err(FinalizeError::UnknownSpot(spot_id).into());
        }
        Ok(index)
    }

    fn spot(&self, spot_id: u64) -> Result<&StoredSpot> {
        self.index_of(spot_id).map(|index| &self.spots[index])
    }
}

/// An accepted alignment record plus its backfill update
#[derive(Clone, Debug)]
pub struct StoredAlignment {
    pub record: AlignmentRecord,
    pub update: Option<AlignmentUpdate>,
}

/// Alignment sink that buffers rows in memory.
///
/// Also serves as a [`ReferencePositions`] source: it remembers the global
/// position of every alignment it accepted.
#[derive(Default)]
pub struct MemoryAlignmentSink {
    rows: Vec<StoredAlignment>,
    positions: HashMap<u64, u64>,
}
impl MemoryAlignmentSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored alignment rows in submission order
    #[must_use]
    pub fn rows(&self) -> &[StoredAlignment] {
        &self.rows
    }
}
impl AlignmentSink for MemoryAlignmentSink {
    fn accept(&mut self, alignment: &AlignmentRecord) -> Result<()> {
        if alignment.primary {
            self.positions
                .insert(alignment.alignment_id, alignment.position);
        }
        self.rows.push(StoredAlignment {
            record: *alignment,
            update: None,
        });
        Ok(())
    }

    fn len(&self) -> u64 {
        self.rows.len() as u64
    }

    fn spot_info(&self, row: u64) -> Result<AlignmentSpotInfo> {
        let stored = self
            .rows
            .get(row as usize)
            .ok_or(FinalizeError::UnknownAlignment(row))?;
        Ok(AlignmentSpotInfo {
            key_id: stored.record.key_id,
            alignment_id: stored.record.alignment_id,
            read_number: stored.record.read_number,
            primary: stored.record.primary,
            position: stored.record.position,
        })
    }

    fn update_alignment(&mut self, row: u64, update: &AlignmentUpdate) -> Result<()> {
        let stored = self
            .rows
            .get_mut(row as usize)
            .ok_or(FinalizeError::UnknownAlignment(row))?;
        stored.update = Some(*update);
        Ok(())
    }
}
impl ReferencePositions for MemoryAlignmentSink {
    fn global_position(&self, alignment_id: u64) -> Result<u64> {
        self.positions
            .get(&alignment_id)
            .copied()
            .ok_or_else(|| FinalizeError::UnknownPosition(alignment_id).into())
    }
}
