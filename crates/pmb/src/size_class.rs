//! Block sizes a single slot can map.

use core::fmt;

use crate::arch::DataWord;

/// One of the block sizes supported by a PMB slot.
///
/// A slot always maps a whole block; the virtual and physical page numbers it holds are
/// the block's base addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SizeClass {
    /// 16 MiB block.
    Size16M,
    /// 64 MiB block.
    Size64M,
    /// 128 MiB block.
    Size128M,
    /// 512 MiB block.
    Size512M,
}

impl SizeClass {
    /// Every size class, largest first. The region mapper decomposes requests in this order.
    pub const DESCENDING: [SizeClass; 4] = [
        SizeClass::Size512M,
        SizeClass::Size128M,
        SizeClass::Size64M,
        SizeClass::Size16M,
    ];

    /// The smallest block a slot can map.
    pub const SMALLEST: SizeClass = SizeClass::Size16M;

    /// Returns the block size in bytes.
    pub const fn bytes(self) -> usize {
        match self {
            SizeClass::Size16M => 16 << 20,
            SizeClass::Size64M => 64 << 20,
            SizeClass::Size128M => 128 << 20,
            SizeClass::Size512M => 512 << 20,
        }
    }

    /// Returns the size bits of a data word encoding this class.
    pub const fn data_bits(self) -> u32 {
        match self {
            SizeClass::Size16M => 0x00,
            SizeClass::Size64M => 0x10,
            SizeClass::Size128M => 0x80,
            SizeClass::Size512M => 0x90,
        }
    }

    /// Decodes the size bits of a raw data word. Bits outside the size field are ignored.
    pub const fn from_data_bits(raw: u32) -> Self {
        match raw & DataWord::SIZE_MASK {
            0x00 => SizeClass::Size16M,
            0x10 => SizeClass::Size64M,
            0x80 => SizeClass::Size128M,
            _ => SizeClass::Size512M,
        }
    }

    /// Returns the size class of exactly `bytes`, if there is one.
    pub fn exact(bytes: usize) -> Option<Self> {
        Self::DESCENDING
            .into_iter()
            .find(|size| size.bytes() == bytes)
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            SizeClass::Size16M => "16MiB",
            SizeClass::Size64M => "64MiB",
            SizeClass::Size128M => "128MiB",
            SizeClass::Size512M => "512MiB",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descending_is_sorted() {
        let sizes = SizeClass::DESCENDING.map(SizeClass::bytes);
        assert!(sizes.windows(2).all(|pair| pair[0] > pair[1]));
        assert_eq!(sizes[3], SizeClass::SMALLEST.bytes());
    }

    #[test]
    fn data_bits_decode() {
        for size in SizeClass::DESCENDING {
            assert_eq!(SizeClass::from_data_bits(size.data_bits() | 0x0800_0109), size);
        }
    }

    #[test]
    fn exact_sizes() {
        assert_eq!(SizeClass::exact(64 << 20), Some(SizeClass::Size64M));
        assert_eq!(SizeClass::exact(80 << 20), None);
    }

    #[test]
    fn formats_in_mebibytes() {
        assert_eq!(format!("{}", SizeClass::Size128M), "128MiB");
    }
}
