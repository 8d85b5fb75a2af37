//! Errors reported by the mapping buffer.

use core::fmt;

/// Errors that can occur while allocating slots or mapping regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// No free slot was available.
    CapacityExhausted,
    /// A specifically requested slot is already allocated.
    SlotBusy,
    /// A specifically requested slot is beyond the table's capacity.
    SlotOutOfRange,
    /// The length is zero, smaller than the smallest block, or leaves the address space.
    InvalidLength,
    /// The virtual and physical addresses have different offsets within a page, so no
    /// block can map one onto the other.
    OffsetMismatch,
    /// The requested virtual range overlaps a live mapping.
    VirtualOverlap,
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::CapacityExhausted => write!(f, "no free mapping slots"),
            MapError::SlotBusy => write!(f, "requested slot is already allocated"),
            MapError::SlotOutOfRange => write!(f, "requested slot is out of range"),
            MapError::InvalidLength => write!(f, "mapping length is not mappable"),
            MapError::OffsetMismatch => {
                write!(f, "virtual and physical page offsets differ")
            }
            MapError::VirtualOverlap => write!(f, "virtual range is already mapped"),
        }
    }
}

impl core::error::Error for MapError {}

/// Outcome of a hardware synchronization that found nothing to import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    /// No slot held a valid mapping of system memory. The table should be initialized
    /// from scratch.
    AllSlotsInvalid,
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::AllSlotsInvalid => write!(f, "no valid boot mappings found"),
        }
    }
}

impl core::error::Error for SyncError {}
