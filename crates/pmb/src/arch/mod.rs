//! Hardware access for the mapping buffer.
//!
//! The table manager talks to hardware exclusively through the [`SlotRegisters`] trait:
//! a fixed array of address/data register pairs indexed by slot number. Two backends
//! are provided:
//!
//! - [`MmioRegisters`], which drives a memory-mapped SH-4A style register array.
//! - [`EmulatedRegisters`], a software register file for tests and host tooling. It is
//!   available when testing or when the `software-emulation` feature is enabled.

mod sh4a;
pub use sh4a::*;

// Use software emulation ONLY when:
// - Running tests, OR
// - software-emulation feature is explicitly enabled
#[cfg(any(test, feature = "software-emulation"))]
mod software;
#[cfg(any(test, feature = "software-emulation"))]
pub use software::EmulatedRegisters;

use crate::SlotIndex;

/// Highest address representable in a slot's page number field.
pub const MAX_ADDRESS: usize = 0xFFFF_FFFF;

/// Validates a physical address.
///
/// Physical addresses must fit within 32 bits.
#[inline]
pub const fn validate_physical(addr: usize) -> bool {
    addr <= MAX_ADDRESS
}

/// Validates a virtual address.
///
/// Virtual addresses must fit within 32 bits.
#[inline]
pub const fn validate_virtual(addr: usize) -> bool {
    addr <= MAX_ADDRESS
}

/// Access to a hardware mapping table.
///
/// Implementations must make every `write_slot` visible to the translation hardware
/// before returning; the table manager never batches writes.
pub trait SlotRegisters {
    /// Returns the number of slots the hardware provides.
    fn capacity(&self) -> usize;

    /// Reads the raw address and data words of a slot.
    fn read_slot(&self, index: SlotIndex) -> (AddressWord, DataWord);

    /// Writes the raw address and data words of a slot.
    ///
    /// The address word is written first, then the data word.
    fn write_slot(&self, index: SlotIndex, address: AddressWord, data: DataWord);

    /// Clears both valid bits of a slot, leaving the remaining fields untouched.
    fn clear_slot(&self, index: SlotIndex) {
        let (address, data) = self.read_slot(index);
        self.write_slot(index, address.with_valid(false), data.with_valid(false));
    }
}

impl<R: SlotRegisters + ?Sized> SlotRegisters for &R {
    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn read_slot(&self, index: SlotIndex) -> (AddressWord, DataWord) {
        (**self).read_slot(index)
    }

    fn write_slot(&self, index: SlotIndex, address: AddressWord, data: DataWord) {
        (**self).write_slot(index, address, data)
    }
}
