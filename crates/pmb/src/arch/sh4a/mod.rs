//! SH-4A Privileged Space Mapping Buffer register arrays.
//!
//! The PMB is exposed as two memory-mapped arrays, one of address words and one of data
//! words, with one register of each kind per slot. Slot `n` lives at
//! `base + (n << SLOT_STRIDE_SHIFT)` in both arrays.

mod flags;
mod words;

pub use flags::EntryFlags;
pub use words::{AddressWord, DataWord};

use core::ptr;
use core::sync::atomic::{Ordering, fence};

use super::SlotRegisters;
use crate::SlotIndex;

/// Physical base of the PMB address array.
pub const ADDRESS_ARRAY_BASE: usize = 0xF610_0000;

/// Physical base of the PMB data array.
pub const DATA_ARRAY_BASE: usize = 0xF710_0000;

/// Shift applied to a slot index to get its offset within either array.
pub const SLOT_STRIDE_SHIFT: usize = 8;

/// Number of slots implemented by SH-4A hardware.
pub const SLOT_COUNT: usize = 16;

/// Number of bits below the page number field of a slot.
pub const PAGE_SHIFT: usize = 24;

/// Granularity of the page number fields (16 MiB).
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

/// Memory-mapped PMB register arrays.
pub struct MmioRegisters {
    address_base: usize,
    data_base: usize,
    capacity: usize,
}

impl MmioRegisters {
    /// Creates a register accessor for arrays at the given addresses.
    ///
    /// # Safety
    ///
    /// `address_base` and `data_base` must be mapped, uncached, and point at the PMB
    /// address and data arrays for at least `capacity` slots for as long as this value
    /// is used.
    pub const unsafe fn new(address_base: usize, data_base: usize, capacity: usize) -> Self {
        Self {
            address_base,
            data_base,
            capacity,
        }
    }

    /// Creates a register accessor for the architectural SH-4A array locations.
    ///
    /// # Safety
    ///
    /// The caller must be running in privileged mode on an SH-4A core with the PMB
    /// enabled, where the arrays are reachable at their architectural addresses.
    pub const unsafe fn sh4a() -> Self {
        // SAFETY: forwarded to the caller.
        unsafe { Self::new(ADDRESS_ARRAY_BASE, DATA_ARRAY_BASE, SLOT_COUNT) }
    }

    fn address_register(&self, index: SlotIndex) -> *mut u32 {
        assert!(index.as_usize() < self.capacity, "slot index out of bounds");
        (self.address_base + (index.as_usize() << SLOT_STRIDE_SHIFT)) as *mut u32
    }

    fn data_register(&self, index: SlotIndex) -> *mut u32 {
        assert!(index.as_usize() < self.capacity, "slot index out of bounds");
        (self.data_base + (index.as_usize() << SLOT_STRIDE_SHIFT)) as *mut u32
    }
}

impl SlotRegisters for MmioRegisters {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn read_slot(&self, index: SlotIndex) -> (AddressWord, DataWord) {
        // SAFETY: `new` requires both arrays to be mapped for every in-range slot, and
        // the register helpers reject out-of-range indices.
        unsafe {
            let address = ptr::read_volatile(self.address_register(index));
            let data = ptr::read_volatile(self.data_register(index));
            (AddressWord::from_raw(address), DataWord::from_raw(data))
        }
    }

    fn write_slot(&self, index: SlotIndex, address: AddressWord, data: DataWord) {
        // SAFETY: as in `read_slot`.
        unsafe {
            ptr::write_volatile(self.address_register(index), address.as_raw());
            ptr::write_volatile(self.data_register(index), data.as_raw());
        }
        fence(Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drives_a_register_window() {
        // Two arrays of 4 slots laid out with the hardware stride.
        let mut window = vec![0u32; 2 * (4 << SLOT_STRIDE_SHIFT) / 4];
        let base = window.as_mut_ptr() as usize;
        let data_base = base + (4 << SLOT_STRIDE_SHIFT);
        let registers = unsafe { MmioRegisters::new(base, data_base, 4) };

        let index = SlotIndex::new(2);
        registers.write_slot(
            index,
            AddressWord::from_raw(0x8000_0100),
            DataWord::from_raw(0x0C00_0118),
        );
        assert_eq!(
            registers.read_slot(index),
            (
                AddressWord::from_raw(0x8000_0100),
                DataWord::from_raw(0x0C00_0118)
            )
        );
        assert_eq!(window[(2 << SLOT_STRIDE_SHIFT) / 4], 0x8000_0100);

        registers.clear_slot(index);
        let (address, data) = registers.read_slot(index);
        assert!(!address.is_valid());
        assert!(!data.is_valid());
    }

    #[test]
    #[should_panic(expected = "slot index out of bounds")]
    fn rejects_out_of_range_slots() {
        let registers = unsafe { MmioRegisters::new(0x1000, 0x2000, 4) };
        registers.read_slot(SlotIndex::new(4));
    }
}
