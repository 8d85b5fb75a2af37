//! Emulated slot register file.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::arch::{AddressWord, DataWord, EntryFlags, SlotRegisters};
use crate::{PhysicalAddress, SizeClass, SlotIndex, VirtualAddress};

/// An in-memory PMB register file.
///
/// Each slot is a pair of atomics, so the register file can be shared between threads
/// the same way the memory-mapped arrays are.
pub struct EmulatedRegisters {
    address: Box<[AtomicU32]>,
    data: Box<[AtomicU32]>,
    writes: AtomicUsize,
}

impl EmulatedRegisters {
    /// Creates a register file with `capacity` slots, all invalid.
    pub fn new(capacity: usize) -> Self {
        Self {
            address: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
            data: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
            writes: AtomicUsize::new(0),
        }
    }

    /// Sets a slot's raw words as firmware would before handing over control.
    ///
    /// Unlike [`SlotRegisters::write_slot`], this is not counted as a write.
    pub fn load(&self, index: SlotIndex, address: AddressWord, data: DataWord) {
        self.address[index.as_usize()].store(address.as_raw(), Ordering::SeqCst);
        self.data[index.as_usize()].store(data.as_raw(), Ordering::SeqCst);
    }

    /// Loads a valid mapping into a slot, as a boot loader would.
    pub fn load_mapping(
        &self,
        index: SlotIndex,
        virt: VirtualAddress,
        phys: PhysicalAddress,
        size: SizeClass,
        flags: EntryFlags,
    ) {
        self.load(
            index,
            AddressWord::new(virt, true),
            DataWord::new(phys, size, flags, true),
        );
    }

    /// Zeroes every register, as a power loss would.
    pub fn reset(&self) {
        for register in self.address.iter().chain(self.data.iter()) {
            register.store(0, Ordering::SeqCst);
        }
    }

    /// Returns how many times [`SlotRegisters::write_slot`] has been called.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Returns the raw words of every slot in index order.
    pub fn snapshot(&self) -> Vec<(AddressWord, DataWord)> {
        (0..self.capacity())
            .map(|index| self.read_slot(SlotIndex::new(index)))
            .collect()
    }
}

impl SlotRegisters for EmulatedRegisters {
    fn capacity(&self) -> usize {
        self.address.len()
    }

    fn read_slot(&self, index: SlotIndex) -> (AddressWord, DataWord) {
        assert!(index.as_usize() < self.capacity(), "slot index out of bounds");
        let address = self.address[index.as_usize()].load(Ordering::SeqCst);
        let data = self.data[index.as_usize()].load(Ordering::SeqCst);
        (AddressWord::from_raw(address), DataWord::from_raw(data))
    }

    fn write_slot(&self, index: SlotIndex, address: AddressWord, data: DataWord) {
        assert!(index.as_usize() < self.capacity(), "slot index out of bounds");
        self.address[index.as_usize()].store(address.as_raw(), Ordering::SeqCst);
        self.data[index.as_usize()].store(data.as_raw(), Ordering::SeqCst);
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CacheMode, CachePolicy};

    #[test]
    fn starts_invalid() {
        let registers = EmulatedRegisters::new(4);
        assert_eq!(registers.capacity(), 4);
        for (address, data) in registers.snapshot() {
            assert!(!address.is_valid());
            assert!(!data.is_valid());
        }
    }

    #[test]
    fn loads_do_not_count_as_writes() {
        let registers = EmulatedRegisters::new(4);
        let flags = EntryFlags::for_policy(CachePolicy::Cached, CacheMode::CopyBack);
        registers.load_mapping(
            SlotIndex::new(1),
            VirtualAddress::new(0x8000_0000),
            PhysicalAddress::new(0x0800_0000),
            SizeClass::Size128M,
            flags,
        );
        assert_eq!(registers.write_count(), 0);

        registers.clear_slot(SlotIndex::new(1));
        assert_eq!(registers.write_count(), 1);
        let (address, data) = registers.read_slot(SlotIndex::new(1));
        assert_eq!(address.page(), VirtualAddress::new(0x8000_0000));
        assert_eq!(data.size_class(), SizeClass::Size128M);
        assert!(!data.is_valid());
    }

    #[test]
    fn reset_wipes_everything() {
        let registers = EmulatedRegisters::new(2);
        registers.write_slot(
            SlotIndex::new(0),
            AddressWord::from_raw(0x8000_0100),
            DataWord::from_raw(0x0800_0108),
        );
        registers.reset();
        assert_eq!(
            registers.read_slot(SlotIndex::new(0)),
            (AddressWord::default(), DataWord::default())
        );
    }
}
