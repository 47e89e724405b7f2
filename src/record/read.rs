use crate::{
    Result,
    error::AssemblyError,
};

/// A zero-copy instrument record submitted to the assembler.
///
/// One `ReadRecord` describes a single physical read: its (possibly
/// untrimmed) name, spot-group text, sequence and quality bytes, and the
/// alignment/pairing evidence the upstream parser derived for it. The
/// assembler resolves the record to a spot identity and decides whether it
/// starts, completes, or duplicates that spot.
///
/// # Example
///
/// ```
/// use spotseq::ReadRecordBuilder;
///
/// let record = ReadRecordBuilder::default()
///     .name(b"RG1:read42/1")
///     .group(b"RG1")
///     .seq(b"ACGTACGT")
///     .qual(b"IIIIFFFF")
///     .mated(true)
///     .read_number(1)
///     .build()
///     .unwrap();
/// assert!(record.is_mated());
/// ```
#[derive(Clone, Copy, Default)]
pub struct ReadRecord<'a> {
    pub(crate) name: &'a [u8],
    pub(crate) group: &'a [u8],
    pub(crate) seq: &'a [u8],
    pub(crate) qual: &'a [u8],
    pub(crate) read_number: u8,
    pub(crate) mated: bool,
    pub(crate) aligned: bool,
    pub(crate) position: u64,
    pub(crate) reverse: bool,
    pub(crate) pcr_duplicate: bool,
    pub(crate) low_quality: bool,
    pub(crate) cs_key: u8,
}

impl<'a> ReadRecord<'a> {
    /// Returns the read name as submitted (before canonicalization)
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'a [u8] {
        self.name
    }

    /// Returns the spot-group / read-group text
    #[inline]
    #[must_use]
    pub fn group(&self) -> &'a [u8] {
        self.group
    }

    /// Returns the sequence bytes
    #[inline]
    #[must_use]
    pub fn seq(&self) -> &'a [u8] {
        self.seq
    }

    /// Returns the quality bytes (empty when the source had none)
    #[inline]
    #[must_use]
    pub fn qual(&self) -> &'a [u8] {
        self.qual
    }

    /// Returns the mate position of this read (1 or 2; 1 when unmated)
    #[inline]
    #[must_use]
    pub fn read_number(&self) -> u8 {
        self.read_number
    }

    /// Whether paired-end evidence is present for this read
    #[inline]
    #[must_use]
    pub fn is_mated(&self) -> bool {
        self.mated
    }

    /// Whether the read carries a confident alignment
    #[inline]
    #[must_use]
    pub fn is_aligned(&self) -> bool {
        self.aligned
    }

    /// Global reference position of the alignment (meaningful only when aligned)
    #[inline]
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Whether the read aligns to the reverse strand
    #[inline]
    #[must_use]
    pub fn is_reverse(&self) -> bool {
        self.reverse
    }

    /// Whether the read was flagged as a PCR duplicate upstream
    #[inline]
    #[must_use]
    pub fn is_pcr_duplicate(&self) -> bool {
        self.pcr_duplicate
    }

    /// Whether the read failed the upstream quality filter
    #[inline]
    #[must_use]
    pub fn is_low_quality(&self) -> bool {
        self.low_quality
    }

    /// Color-space key character (0 when base space)
    #[inline]
    #[must_use]
    pub fn cs_key(&self) -> u8 {
        self.cs_key
    }
}

/// A convenience builder struct for creating a [`ReadRecord`]
///
/// Validates the mate-pair read number, the quality length, and the required
/// fields before handing out a record.
///
/// # Example
///
/// ```
/// use spotseq::ReadRecordBuilder;
///
/// // an unmated, aligned read
/// let record = ReadRecordBuilder::default()
///     .name(b"frag_001")
///     .seq(b"ACGTACGT")
///     .aligned(true)
///     .position(1_204)
///     .build()
///     .unwrap();
/// assert_eq!(record.read_number(), 1);
/// ```
#[derive(Default)]
pub struct ReadRecordBuilder<'a> {
    name: Option<&'a [u8]>,
    group: &'a [u8],
    seq: Option<&'a [u8]>,
    qual: &'a [u8],
    read_number: Option<u8>,
    mated: bool,
    aligned: bool,
    position: u64,
    reverse: bool,
    pcr_duplicate: bool,
    low_quality: bool,
    cs_key: u8,
}

impl<'a> ReadRecordBuilder<'a> {
    /// Sets the read name (required)
    #[must_use]
    pub fn name(mut self, name: &'a [u8]) -> Self {
        self.name = Some(name);
        self
    }

    /// Sets the spot-group / read-group text
    #[must_use]
    pub fn group(mut self, group: &'a [u8]) -> Self {
        self.group = group;
        self
    }

    /// Sets the sequence bytes (required)
    #[must_use]
    pub fn seq(mut self, seq: &'a [u8]) -> Self {
        self.seq = Some(seq);
        self
    }

    /// Sets the quality bytes (must cover the sequence when present)
    #[must_use]
    pub fn qual(mut self, qual: &'a [u8]) -> Self {
        self.qual = qual;
        self
    }

    /// Sets the mate position (1 or 2)
    #[must_use]
    pub fn read_number(mut self, read_number: u8) -> Self {
        self.read_number = Some(read_number);
        self
    }

    /// Marks the read as one half of a mate pair
    #[must_use]
    pub fn mated(mut self, mated: bool) -> Self {
        self.mated = mated;
        self
    }

    /// Marks the read as confidently aligned
    #[must_use]
    pub fn aligned(mut self, aligned: bool) -> Self {
        self.aligned = aligned;
        self
    }

    /// Sets the alignment's global reference position
    #[must_use]
    pub fn position(mut self, position: u64) -> Self {
        self.position = position;
        self
    }

    /// Marks the read as reverse-strand
    #[must_use]
    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Sets the upstream PCR-duplicate flag
    #[must_use]
    pub fn pcr_duplicate(mut self, pcr_duplicate: bool) -> Self {
        self.pcr_duplicate = pcr_duplicate;
        self
    }

    /// Sets the upstream quality-filter flag
    #[must_use]
    pub fn low_quality(mut self, low_quality: bool) -> Self {
        self.low_quality = low_quality;
        self
    }

    /// Sets the color-space key character
    #[must_use]
    pub fn cs_key(mut self, cs_key: u8) -> Self {
        self.cs_key = cs_key;
        self
    }

    /// Builds the `ReadRecord`
    ///
    /// # Errors
    ///
    /// Returns an error if the name or sequence is missing, the read number
    /// is outside {1, 2}, or the quality bytes do not cover the sequence.
    pub fn build(self) -> Result<ReadRecord<'a>> {
        let Some(name) = self.name else {
            return Err(AssemblyError::MissingName.into());
        };
        let Some(seq) = self.seq else {
            return Err(AssemblyError::MissingSequence.into());
        };
        if !self.qual.is_empty() && self.qual.len() != seq.len() {
            return Err(AssemblyError::QualityLengthMismatch(seq.len(), self.qual.len()).into());
        }
        let read_number = self.read_number.unwrap_or(1);
        if read_number != 1 && read_number != 2 {
            return Err(AssemblyError::InvalidReadNumber(read_number).into());
        }
        Ok(ReadRecord {
            name,
            group: self.group,
            seq,
            qual: self.qual,
            read_number,
            mated: self.mated,
            aligned: self.aligned,
            position: self.position,
            reverse: self.reverse,
            pcr_duplicate: self.pcr_duplicate,
            low_quality: self.low_quality,
            cs_key: self.cs_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AssemblyError, Error};

    #[test]
    fn test_builder_requires_name_and_seq() {
        let result = ReadRecordBuilder::default().seq(b"ACGT").build();
        assert!(matches!(
            result,
            Err(Error::AssemblyError(AssemblyError::MissingName))
        ));

        let result = ReadRecordBuilder::default().name(b"r1").build();
        assert!(matches!(
            result,
            Err(Error::AssemblyError(AssemblyError::MissingSequence))
        ));
    }

    #[test]
    fn test_builder_validates_read_number() {
        let result = ReadRecordBuilder::default()
            .name(b"r1")
            .seq(b"ACGT")
            .read_number(3)
            .build();
        assert!(matches!(
            result,
            Err(Error::AssemblyError(AssemblyError::InvalidReadNumber(3)))
        ));
    }

    #[test]
    fn test_builder_validates_quality_length() {
        let result = ReadRecordBuilder::default()
            .name(b"r1")
            .seq(b"ACGT")
            .qual(b"II")
            .build();
        assert!(matches!(
            result,
            Err(Error::AssemblyError(AssemblyError::QualityLengthMismatch(
                4, 2
            )))
        ));

        // empty quality is allowed
        let record = ReadRecordBuilder::default()
            .name(b"r1")
            .seq(b"ACGT")
            .build()
            .unwrap();
        assert!(record.qual().is_empty());
    }

    #[test]
    fn test_read_number_defaults_to_one() {
        let record = ReadRecordBuilder::default()
            .name(b"r1")
            .seq(b"ACGT")
            .build()
            .unwrap();
        assert_eq!(record.read_number(), 1);
        assert!(!record.is_mated());
    }
}
