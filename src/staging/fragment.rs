use std::io::Write;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::{
    Result,
    error::StagingError,
    record::ReadRecord,
};

/// Staged read carried a confident alignment
const FRAG_ALIGNED: u8 = 1 << 0;

/// Staged read failed the upstream quality filter
const FRAG_LOW_QUALITY: u8 = 1 << 1;

/// Staged read is reverse-strand
const FRAG_REVERSE: u8 = 1 << 2;

/// Quality bytes follow the sequence bytes
const FRAG_HAS_QUALITY: u8 = 1 << 3;

/// Fixed header size of an encoded fragment
const HEADER_LEN: usize = 8 + 4 + 4 + 1 + 1 + 1 + 1;

/// The serialized first-seen read of a mate pair.
///
/// Held in the staging store until the mate arrives or ingestion ends.
/// Layout (little-endian): source read index, read length, group length,
/// flag byte, read number, color-space key, one reserved byte, then the
/// sequence bytes, quality bytes (when present, same length as the
/// sequence), and the read-group text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagedFragment {
    /// Ordinal of the source instrument record
    pub read_index: u64,
    /// Mate position of the staged read (1 or 2)
    pub read_number: u8,
    /// Whether the read was aligned when staged
    pub aligned: bool,
    /// Upstream quality-filter flag
    pub low_quality: bool,
    /// Reverse-strand orientation
    pub reverse: bool,
    /// Color-space key character (0 when base space)
    pub cs_key: u8,
    /// Sequence bytes
    pub seq: Vec<u8>,
    /// Quality bytes (empty when the source had none)
    pub qual: Vec<u8>,
    /// Read-group text
    pub group: Vec<u8>,
}

impl StagedFragment {
    /// Captures an owned fragment from an incoming record
    #[must_use]
    pub fn from_read(record: &ReadRecord<'_>, read_index: u64) -> Self {
        Self {
            read_index,
            read_number: record.read_number,
            aligned: record.aligned,
            low_quality: record.low_quality,
            reverse: record.reverse,
            cs_key: record.cs_key,
            seq: record.seq.to_vec(),
            qual: record.qual.to_vec(),
            group: record.group.to_vec(),
        }
    }

    /// Size of the encoded form
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.seq.len() + self.qual.len() + self.group.len()
    }

    fn flag_byte(&self) -> u8 {
        let mut flags = 0;
        if self.aligned {
            flags |= FRAG_ALIGNED;
        }
        if self.low_quality {
            flags |= FRAG_LOW_QUALITY;
        }
        if self.reverse {
            flags |= FRAG_REVERSE;
        }
        if !self.qual.is_empty() {
            flags |= FRAG_HAS_QUALITY;
        }
        flags
    }

    /// Serializes the fragment into `buf`
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.reserve(self.encoded_len());
        buf.write_u64::<LittleEndian>(self.read_index)?;
        buf.write_u32::<LittleEndian>(self.seq.len() as u32)?;
        buf.write_u32::<LittleEndian>(self.group.len() as u32)?;
        buf.write_u8(self.flag_byte())?;
        buf.write_u8(self.read_number)?;
        buf.write_u8(self.cs_key)?;
        buf.write_u8(0)?;
        buf.write_all(&self.seq)?;
        buf.write_all(&self.qual)?;
        buf.write_all(&self.group)?;
        Ok(())
    }

    /// Deserializes a fragment previously written by [`encode`](Self::encode)
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let total = bytes.len();
        if total < HEADER_LEN {
            return Err(StagingError::TruncatedFragment {
                expected: HEADER_LEN,
                found: total,
            }
            .into());
        }
        let mut cursor = bytes;
        let read_index = cursor.read_u64::<LittleEndian>()?;
        let read_len = cursor.read_u32::<LittleEndian>()? as usize;
        let group_len = cursor.read_u32::<LittleEndian>()? as usize;
        let flags = cursor.read_u8()?;
        let read_number = cursor.read_u8()?;
        let cs_key = cursor.read_u8()?;
        let _reserved = cursor.read_u8()?;

        let qual_len = if flags & FRAG_HAS_QUALITY != 0 {
            read_len
        } else {
            0
        };
        let expected = HEADER_LEN + read_len + qual_len + group_len;
        if total < expected {
            return Err(StagingError::TruncatedFragment {
                expected,
                found: total,
            }
            .into());
        }

        let (seq, rest) = cursor.split_at(read_len);
        let (qual, rest) = rest.split_at(qual_len);
        let group = &rest[..group_len];

        Ok(Self {
            read_index,
            read_number,
            aligned: flags & FRAG_ALIGNED != 0,
            low_quality: flags & FRAG_LOW_QUALITY != 0,
            reverse: flags & FRAG_REVERSE != 0,
            cs_key,
            seq: seq.to_vec(),
            qual: qual.to_vec(),
            group: group.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ReadRecordBuilder;

    fn fragment() -> StagedFragment {
        let record = ReadRecordBuilder::default()
            .name(b"RG1:read42/1")
            .group(b"RG1")
            .seq(b"ACGTACGT")
            .qual(b"IIIIFFFF")
            .mated(true)
            .read_number(1)
            .aligned(true)
            .reverse(true)
            .build()
            .unwrap();
        StagedFragment::from_read(&record, 17)
    }

    #[test]
    fn test_codec_preserves_fragment() -> Result<()> {
        let fragment = fragment();
        let mut buf = Vec::new();
        fragment.encode(&mut buf)?;
        assert_eq!(buf.len(), fragment.encoded_len());

        let decoded = StagedFragment::decode(&buf)?;
        assert_eq!(decoded, fragment);
        Ok(())
    }

    #[test]
    fn test_missing_quality_is_not_materialized() -> Result<()> {
        let record = ReadRecordBuilder::default()
            .name(b"solo")
            .seq(b"ACGT")
            .build()
            .unwrap();
        let fragment = StagedFragment::from_read(&record, 0);

        let mut buf = Vec::new();
        fragment.encode(&mut buf)?;
        let decoded = StagedFragment::decode(&buf)?;
        assert!(decoded.qual.is_empty());
        assert_eq!(decoded.seq, b"ACGT");
        Ok(())
    }

    #[test]
    fn test_truncated_fragment_is_rejected() {
        let fragment = fragment();
        let mut buf = Vec::new();
        fragment.encode(&mut buf).unwrap();

        let result = StagedFragment::decode(&buf[..buf.len() - 3]);
        assert!(matches!(
            result,
            Err(crate::Error::StagingError(
                StagingError::TruncatedFragment { .. }
            ))
        ));

        let result = StagedFragment::decode(&buf[..4]);
        assert!(matches!(
            result,
            Err(crate::Error::StagingError(
                StagingError::TruncatedFragment { .. }
            ))
        ));
    }
}
