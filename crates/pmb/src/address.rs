//! Address types for the mapping buffer.
//!
//! The mapping buffer translates a 32-bit virtual address space onto a 32-bit physical
//! address space in blocks of at least [`PAGE_SIZE`](crate::PAGE_SIZE) bytes. These
//! newtypes keep the two kinds of address apart and provide the alignment helpers the
//! region mapper needs.

use core::fmt;
use core::ops::{Add, Sub};

use crate::arch;

/// Macro to define common address type functionality.
///
/// This macro generates the structure and methods shared by physical and virtual
/// addresses, reducing code duplication.
macro_rules! impl_address_common {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            /// The zero address.
            pub const ZERO: Self = Self(0);

            /// Returns the raw address value.
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0
            }

            /// Checks if the address is aligned to the given alignment.
            ///
            /// # Panics
            ///
            /// Panics if `align` is not a power of two.
            #[inline]
            pub const fn is_aligned(self, align: usize) -> bool {
                assert!(align.is_power_of_two(), "alignment must be a power of two");
                self.0 & (align - 1) == 0
            }

            /// Aligns the address down to the given alignment.
            ///
            /// # Panics
            ///
            /// Panics if `align` is not a power of two.
            #[inline]
            pub const fn align_down(self, align: usize) -> Self {
                assert!(align.is_power_of_two(), "alignment must be a power of two");
                Self(self.0 & !(align - 1))
            }

            /// Returns the offset of this address within its hardware page.
            #[inline]
            pub const fn page_offset(self) -> usize {
                self.0 & (arch::PAGE_SIZE - 1)
            }

            /// Adds `rhs` bytes, returning `None` if the result leaves the address space.
            #[inline]
            pub const fn checked_add(self, rhs: usize) -> Option<Self> {
                match self.0.checked_add(rhs) {
                    Some(sum) if sum <= arch::MAX_ADDRESS => Some(Self(sum)),
                    _ => None,
                }
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#010x})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#010x}", self.0)
            }
        }

        impl From<u32> for $name {
            #[inline]
            fn from(addr: u32) -> Self {
                Self(addr as usize)
            }
        }

        impl From<usize> for $name {
            #[inline]
            fn from(addr: usize) -> Self {
                Self::new(addr)
            }
        }

        impl Add<usize> for $name {
            type Output = Self;

            #[inline]
            fn add(self, rhs: usize) -> Self::Output {
                Self::new(self.0 + rhs)
            }
        }

        impl Sub<usize> for $name {
            type Output = Self;

            #[inline]
            fn sub(self, rhs: usize) -> Self::Output {
                Self::new(self.0 - rhs)
            }
        }

        impl Sub<$name> for $name {
            type Output = usize;

            #[inline]
            fn sub(self, rhs: $name) -> Self::Output {
                self.0 - rhs.0
            }
        }
    };
}

impl_address_common!(
    PhysicalAddress,
    "A physical memory address.\n\n\
     Physical addresses handed to the mapping buffer must fit in the 32-bit physical\n\
     address space reachable through a slot's page number field."
);

impl PhysicalAddress {
    /// Creates a new physical address.
    ///
    /// # Panics
    ///
    /// Panics if the address exceeds the 32-bit physical address width.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        assert!(
            arch::validate_physical(addr),
            "physical address exceeds maximum width"
        );
        Self(addr)
    }
}

impl_address_common!(
    VirtualAddress,
    "A virtual memory address.\n\n\
     Virtual addresses handed to the mapping buffer must fit in the 32-bit privileged\n\
     address space covered by a slot's page number field."
);

impl VirtualAddress {
    /// Creates a new virtual address.
    ///
    /// # Panics
    ///
    /// Panics if the address exceeds the 32-bit virtual address width.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        assert!(
            arch::validate_virtual(addr),
            "virtual address exceeds maximum width"
        );
        Self(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PAGE_SIZE;

    #[test]
    fn new_max_valid_address() {
        let addr = PhysicalAddress::new(0xFFFF_FFFF);
        assert_eq!(addr.as_usize(), 0xFFFF_FFFF);
    }

    #[test]
    #[should_panic(expected = "physical address exceeds maximum width")]
    fn physical_exceeds_max() {
        PhysicalAddress::new(1usize << 32);
    }

    #[test]
    #[should_panic(expected = "virtual address exceeds maximum width")]
    fn virtual_exceeds_max() {
        VirtualAddress::new(1usize << 32);
    }

    #[test]
    fn page_alignment() {
        let addr = VirtualAddress::new(100 << 20);
        assert!(!addr.is_aligned(PAGE_SIZE));
        assert_eq!(addr.align_down(PAGE_SIZE), VirtualAddress::new(96 << 20));
        assert_eq!(addr.page_offset(), 4 << 20);
    }

    #[test]
    fn checked_add_stops_at_the_top() {
        let addr = VirtualAddress::new(0xF000_0000);
        assert_eq!(
            addr.checked_add(0x0FFF_FFFF),
            Some(VirtualAddress::new(0xFFFF_FFFF))
        );
        assert_eq!(addr.checked_add(0x1000_0000), None);
    }

    #[test]
    fn formats_as_hex() {
        assert_eq!(format!("{}", PhysicalAddress::new(0x0C00_0000)), "0x0c000000");
        assert_eq!(
            format!("{:?}", VirtualAddress::new(0x8000_0000)),
            "VirtualAddress(0x80000000)"
        );
    }
}
