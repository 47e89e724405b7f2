//! Configuration for the spot assembly engine
//!
//! This module defines the tunables a driver hands to the
//! [`SpotAssemblerBuilder`](crate::SpotAssemblerBuilder): sequencing platform
//! defaults, read-group partitioning mode, read-name canonicalization, the
//! data-inconsistency error budget, and the distant-mate threshold used by
//! the alignment backfill pass.

use std::collections::HashMap;

/// Maximum number of read-group partitions a registry may allocate.
///
/// The partition index is carried in the high 32 bits of every keyId but is
/// bounded by the 8-bit encoding used in the recency cache.
pub const MAX_PARTITIONS: usize = 256;

/// Default distance (in global reference coordinates) beyond which a mate is
/// considered "far" and its position is resolved during the alignment
/// backfill pass.
pub const DEFAULT_MATE_DISTANCE: u64 = 10_000;

/// Default cap on data-inconsistency events before the next one turns fatal
pub const DEFAULT_MAX_ERRORS: u64 = 10;

/// Default cap on data-inconsistency events as a percentage of records seen
pub const DEFAULT_MAX_ERROR_PERCENT: f64 = 5.0;

/// Sequencing platform of a read group
///
/// Stored as a single byte in each identity record; resolved per read group
/// from [`AssemblerConfig::group_platforms`] with
/// [`AssemblerConfig::default_platform`] as the fallback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Platform {
    #[default]
    Undefined = 0,
    Capillary = 1,
    LS454 = 2,
    Illumina = 3,
    Solid = 4,
    IonTorrent = 5,
    PacBio = 6,
    Nanopore = 7,
}
impl Platform {
    /// Returns the byte code stored in identity records
    #[inline]
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decodes a stored byte code, falling back to `Undefined`
    #[must_use]
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Capillary,
            2 => Self::LS454,
            3 => Self::Illumina,
            4 => Self::Solid,
            5 => Self::IonTorrent,
            6 => Self::PacBio,
            7 => Self::Nanopore,
            _ => Self::Undefined,
        }
    }
}

/// Tunables for a [`SpotAssembler`](crate::SpotAssembler) run
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Platform recorded for read groups absent from `group_platforms`
    pub default_platform: Platform,

    /// Per-read-group platform overrides (from run metadata)
    pub group_platforms: HashMap<Vec<u8>, Platform>,

    /// Collapse all read groups into a single composite-key partition
    ///
    /// Set when read-group cardinality cannot be bounded in advance.
    pub single_partition: bool,

    /// Upper bound on read-group partitions, at most [`MAX_PARTITIONS`]
    pub max_partitions: usize,

    /// Canonicalize read names by trimming a recognized mate suffix
    /// (`name#0/1`, `name/2`)
    pub trim_read_suffix: bool,

    /// Data-inconsistency events tolerated before the next one turns fatal
    pub max_errors: u64,

    /// Data-inconsistency events tolerated as a percentage of records seen
    pub max_error_percent: f64,

    /// Distance beyond which a mate's reference position is backfilled
    pub mate_distance_threshold: u64,
}
impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            default_platform: Platform::Undefined,
            group_platforms: HashMap::new(),
            single_partition: false,
            max_partitions: MAX_PARTITIONS,
            trim_read_suffix: true,
            max_errors: DEFAULT_MAX_ERRORS,
            max_error_percent: DEFAULT_MAX_ERROR_PERCENT,
            mate_distance_threshold: DEFAULT_MATE_DISTANCE,
        }
    }
}
impl AssemblerConfig {
    /// Resolves the platform for a read group
    #[must_use]
    pub fn platform_of(&self, group: &[u8]) -> Platform {
        self.group_platforms
            .get(group)
            .copied()
            .unwrap_or(self.default_platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_code_roundtrip() {
        for platform in [
            Platform::Undefined,
            Platform::Capillary,
            Platform::LS454,
            Platform::Illumina,
            Platform::Solid,
            Platform::IonTorrent,
            Platform::PacBio,
            Platform::Nanopore,
        ] {
            assert_eq!(Platform::from_code(platform.code()), platform);
        }
        // unknown codes fall back to Undefined
        assert_eq!(Platform::from_code(200), Platform::Undefined);
    }

    #[test]
    fn test_platform_of_falls_back_to_default() {
        let mut config = AssemblerConfig {
            default_platform: Platform::Illumina,
            ..AssemblerConfig::default()
        };
        config
            .group_platforms
            .insert(b"RG454".to_vec(), Platform::LS454);

        assert_eq!(config.platform_of(b"RG454"), Platform::LS454);
        assert_eq!(config.platform_of(b"OTHER"), Platform::Illumina);
    }

    #[test]
    fn test_default_bounds() {
        let config = AssemblerConfig::default();
        assert_eq!(config.max_partitions, MAX_PARTITIONS);
        assert!(config.trim_read_suffix);
        assert_eq!(config.mate_distance_threshold, DEFAULT_MATE_DISTANCE);
    }
}
