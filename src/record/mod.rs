//! Record types exchanged with the assembler and its sinks

mod read;
mod spot;

pub use read::{ReadRecord, ReadRecordBuilder};
pub use spot::{
    AlignmentRecord, AlignmentSpotInfo, AlignmentUpdate, SpotRead, SpotRecord, SpotUpdate,
};
