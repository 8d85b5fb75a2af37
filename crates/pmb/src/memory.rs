//! Physical memory ranges recognized by the system.

use crate::PhysicalAddress;

/// A contiguous range of physical memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    base: PhysicalAddress,
    size: usize,
}

impl MemoryRegion {
    /// Creates a new memory region.
    pub const fn new(base: PhysicalAddress, size: usize) -> Self {
        Self { base, size }
    }

    /// Returns the base address of this region.
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    /// Returns the size of this region in bytes.
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Returns the last byte of this region, or `None` if the region is empty.
    ///
    /// A region may end exactly at the top of the physical address space, where the
    /// exclusive end does not fit in 32 bits.
    pub const fn last(&self) -> Option<usize> {
        match self.size.checked_sub(1) {
            Some(offset) => self.base.as_usize().checked_add(offset),
            None => None,
        }
    }

    /// Returns true if `address` lies within this region.
    pub const fn contains(&self, address: PhysicalAddress) -> bool {
        address.as_usize() >= self.base.as_usize()
            && address.as_usize() - self.base.as_usize() < self.size
    }
}
