//! Raw PMB address and data words.

use super::{EntryFlags, PAGE_SIZE};
use crate::{PhysicalAddress, SizeClass, VirtualAddress};

/// Bits shared by both word formats.
const VALID: u32 = 1 << 8;
const PAGE_MASK: u32 = !(PAGE_SIZE as u32 - 1);

/// A PMB address array word.
///
/// The word format:
/// - Bits 24-31: Virtual page number
/// - Bit 8: Valid
/// - All other bits reserved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct AddressWord(u32);

impl AddressWord {
    /// Creates an address word for the page containing `page`.
    pub const fn new(page: VirtualAddress, valid: bool) -> Self {
        let page_bits = page.as_usize() as u32 & PAGE_MASK;
        Self(if valid { page_bits | VALID } else { page_bits })
    }

    /// Creates an address word from its raw register value.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw register value.
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Returns the virtual page this word selects.
    pub const fn page(self) -> VirtualAddress {
        VirtualAddress::new((self.0 & PAGE_MASK) as usize)
    }

    /// Returns whether the valid bit is set.
    pub const fn is_valid(self) -> bool {
        (self.0 & VALID) != 0
    }

    /// Returns a copy of this word with the valid bit set or cleared.
    pub const fn with_valid(self, valid: bool) -> Self {
        if valid {
            Self(self.0 | VALID)
        } else {
            Self(self.0 & !VALID)
        }
    }
}

/// A PMB data array word.
///
/// The word format:
/// - Bits 24-31: Physical page number
/// - Bit 9: Unbuffered
/// - Bit 8: Valid
/// - Bits 7 and 4: Size class
/// - Bit 3: Cacheable
/// - Bit 0: Write-through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct DataWord(u32);

impl DataWord {
    /// Size bit mask (bits 7 and 4).
    pub(crate) const SIZE_MASK: u32 = 0x90;

    /// Creates a data word mapping a block of `size` at `page` with `flags`.
    pub const fn new(
        page: PhysicalAddress,
        size: SizeClass,
        flags: EntryFlags,
        valid: bool,
    ) -> Self {
        let raw = (page.as_usize() as u32 & PAGE_MASK) | size.data_bits() | flags.to_raw();
        Self(if valid { raw | VALID } else { raw })
    }

    /// Creates a data word from its raw register value.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw register value.
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Returns the physical page this word maps to.
    pub const fn page(self) -> PhysicalAddress {
        PhysicalAddress::new((self.0 & PAGE_MASK) as usize)
    }

    /// Returns the block size encoded in this word.
    pub const fn size_class(self) -> SizeClass {
        SizeClass::from_data_bits(self.0)
    }

    /// Returns the cache attributes encoded in this word.
    pub const fn flags(self) -> EntryFlags {
        EntryFlags::from_raw(self.0)
    }

    /// Returns a copy of this word with its cache attributes replaced.
    pub const fn with_flags(self, flags: EntryFlags) -> Self {
        Self((self.0 & !EntryFlags::MASK) | flags.to_raw())
    }

    /// Returns whether the valid bit is set.
    pub const fn is_valid(self) -> bool {
        (self.0 & VALID) != 0
    }

    /// Returns a copy of this word with the valid bit set or cleared.
    pub const fn with_valid(self, valid: bool) -> Self {
        if valid {
            Self(self.0 | VALID)
        } else {
            Self(self.0 & !VALID)
        }
    }
}
