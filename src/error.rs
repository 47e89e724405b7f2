use std::error::Error as StdError;

/// Custom Result type for spotseq operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the spotseq library, encompassing all possible error
/// cases that can occur while assembling spots from instrument records.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Errors raised while resolving read identities
    #[error("Error resolving read identity: {0}")]
    RegistryError(#[from] RegistryError),

    /// Errors raised by the identity ledger
    #[error("Error in identity ledger: {0}")]
    LedgerError(#[from] LedgerError),

    /// Errors raised by the fragment staging store
    #[error("Error in fragment staging store: {0}")]
    StagingError(#[from] StagingError),

    /// Errors that occur while consuming instrument records
    #[error("Error assembling spots: {0}")]
    AssemblyError(#[from] AssemblyError),

    /// Errors that occur during the post-ingestion backfill passes
    #[error("Error finalizing archive: {0}")]
    FinalizeError(#[from] FinalizeError),

    /// Standard I/O errors (resource exhaustion in a backing store)
    #[error("Error with IO: {0}")]
    IoError(#[from] std::io::Error),

    /// Conversion errors from anyhow errors
    #[cfg(feature = "anyhow")]
    #[error("Generic error: {0}")]
    AnyhowError(#[from] anyhow::Error),

    /// Generic errors for other unexpected situations
    #[error("Generic error: {0}")]
    GenericError(#[from] Box<dyn StdError + Send + Sync>),
}
impl Error {
    /// Checks if the error is the "excessive errors" condition raised when the
    /// data-inconsistency budget has been exhausted.
    ///
    /// Useful for drivers that want to distinguish bad input data from
    /// structural failures when deciding whether to keep partial results.
    #[must_use]
    pub fn is_excessive_errors(&self) -> bool {
        matches!(
            self,
            Self::AssemblyError(AssemblyError::ExcessiveErrors { .. })
        )
    }

    /// Checks if the error is the cooperative-cancellation signal.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::AssemblyError(AssemblyError::Cancelled))
    }
}

/// Errors specific to the key registry (read name → keyId resolution)
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    /// A new read-group partition was needed but the fixed maximum is in use
    ///
    /// # Arguments
    /// * `usize` - The number of partitions already allocated
    #[error("Read group partition limit reached ({0} partitions in use)")]
    PartitionLimit(usize),

    /// A partition assigned more name counters than fit in the keyId layout
    ///
    /// The parameter is the index of the overflowing partition.
    #[error("Name counter overflow in partition {0} - too many distinct read names")]
    CounterOverflow(u32),
}

/// Errors raised by the identity ledger
#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    /// A backfill pass asked for a keyId that was never resolved during ingestion
    #[error("Key {0:#x} was never resolved during ingestion")]
    KeyNeverResolved(u64),
}

/// Errors raised by the fragment staging store
#[derive(thiserror::Error, Debug)]
pub enum StagingError {
    /// The handle does not reference a live staged object
    #[error("Invalid staging handle: {0:#x}")]
    InvalidHandle(u64),

    /// More bytes were written than the handle's allocation can hold
    ///
    /// # Arguments
    /// * First `usize` - The number of bytes being written
    /// * Second `usize` - The allocated capacity
    #[error("Staged object of {0} bytes exceeds its allocation of {1} bytes")]
    ObjectOverflow(usize, usize),

    /// A staged fragment ended before its declared payload
    #[error("Truncated staged fragment: expected {expected} bytes, found {found}")]
    TruncatedFragment { expected: usize, found: usize },
}

/// Errors that occur while consuming instrument records
#[derive(thiserror::Error, Debug)]
pub enum AssemblyError {
    /// A record carried a read number outside the mate-pair range
    #[error("Invalid read number: {0} - expecting 1 or 2")]
    InvalidReadNumber(u8),

    /// A record was built without a read name
    #[error("Missing read name in record builder")]
    MissingName,

    /// A record was built without sequence bytes
    #[error("Missing sequence in record builder")]
    MissingSequence,

    /// Quality bytes were supplied but do not cover the sequence
    ///
    /// # Arguments
    /// * First `usize` - The sequence length
    /// * Second `usize` - The quality length
    #[error("Quality length ({1}) does not match sequence length ({0})")]
    QualityLengthMismatch(usize, usize),

    /// The data-inconsistency budget was exhausted
    #[error("Excessive errors in input data ({errors} events, limit {max_errors})")]
    ExcessiveErrors { errors: u64, max_errors: u64 },

    /// The caller requested a cooperative stop between records
    #[error("Ingestion cancelled by caller")]
    Cancelled,

    /// A previous fatal error poisoned the assembler
    #[error("Ingestion previously aborted - no further records accepted")]
    Aborted,
}

/// Errors that occur during the post-ingestion backfill passes
#[derive(thiserror::Error, Debug)]
pub enum FinalizeError {
    /// The ledger and the sequence writer disagree on a spot id
    ///
    /// This indicates structural corruption, not bad input data, and is fatal
    /// regardless of the error budget.
    #[error(
        "Spot id mismatch at row {spot_id}: ledger holds {stored} for key {key_id:#x} - archive is corrupt"
    )]
    SpotIdMismatch {
        spot_id: u64,
        stored: u64,
        key_id: u64,
    },

    /// A sink was asked about a spot id it never received
    #[error("Unknown spot id: {0}")]
    UnknownSpot(u64),

    /// An alignment row index past the end of the alignment sink
    #[error("Unknown alignment row: {0}")]
    UnknownAlignment(u64),

    /// A reference-position source was asked about an id it does not know
    #[error("Unknown alignment id in position source: {0}")]
    UnknownPosition(u64),

    /// Finalization was requested after ingestion failed
    #[error("Ingestion aborted - backfill passes cannot run")]
    IngestionAborted,
}

/// Trait for converting arbitrary errors into `Error`
pub trait IntoSpotseqError {
    fn into_spotseq_error(self) -> Error;
}

// Implement conversion for Box<dyn Error>
impl<E> IntoSpotseqError for E
where
    E: StdError + Send + Sync + 'static,
{
    fn into_spotseq_error(self) -> Error {
        Error::GenericError(Box::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum MyError {
        #[error("Custom error: {0}")]
        CustomError(String),
    }

    #[test]
    fn test_into_spotseq_error() {
        let my_error = MyError::CustomError(String::from("some error"));
        let error = my_error.into_spotseq_error();
        assert!(matches!(error, Error::GenericError(_)));
    }

    #[test]
    fn test_is_excessive_errors() {
        let error = Error::AssemblyError(AssemblyError::ExcessiveErrors {
            errors: 3,
            max_errors: 2,
        });
        assert!(error.is_excessive_errors());
        assert!(!error.is_cancelled());

        let error = Error::AssemblyError(AssemblyError::Cancelled);
        assert!(error.is_cancelled());
        assert!(!error.is_excessive_errors());
    }

    #[test]
    fn test_registry_error_display() {
        let error = RegistryError::PartitionLimit(256);
        assert!(format!("{error}").contains("256"));

        let error = RegistryError::CounterOverflow(7);
        assert!(format!("{error}").contains("7"));
    }

    #[test]
    fn test_staging_error_display() {
        let error = StagingError::ObjectOverflow(128, 64);
        let msg = format!("{error}");
        assert!(msg.contains("128"));
        assert!(msg.contains("64"));

        let error = StagingError::TruncatedFragment {
            expected: 100,
            found: 20,
        };
        let msg = format!("{error}");
        assert!(msg.contains("100"));
        assert!(msg.contains("20"));
    }

    #[test]
    fn test_finalize_error_display() {
        let error = FinalizeError::SpotIdMismatch {
            spot_id: 5,
            stored: 9,
            key_id: 0x1_0000_0002,
        };
        let msg = format!("{error}");
        assert!(msg.contains("row 5"));
        assert!(msg.contains("corrupt"));
    }

    #[test]
    fn test_error_from_subsystem_errors() {
        let error: Error = RegistryError::PartitionLimit(1).into();
        assert!(matches!(error, Error::RegistryError(_)));

        let error: Error = LedgerError::KeyNeverResolved(42).into();
        assert!(matches!(error, Error::LedgerError(_)));

        let error: Error = StagingError::InvalidHandle(0).into();
        assert!(matches!(error, Error::StagingError(_)));

        let error: Error = FinalizeError::UnknownSpot(1).into();
        assert!(matches!(error, Error::FinalizeError(_)));
    }
}
