//! Software shadow of a single slot.

use alloc::vec::Vec;
use core::fmt;

use crate::arch::{AddressWord, DataWord, EntryFlags, MAX_ADDRESS};
use crate::{CachePolicy, PhysicalAddress, SizeClass, VirtualAddress};

/// Position of a slot in the fixed-capacity table.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SlotIndex(usize);

impl SlotIndex {
    /// Creates a new slot index.
    #[inline]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the raw slot index.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Debug for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotIndex({})", self.0)
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// Which slot [`SlotAllocator::allocate`](crate::SlotAllocator::allocate) should hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotHint {
    /// The lowest free slot.
    Any,
    /// Exactly this slot.
    Exact(SlotIndex),
}

/// The software shadow of one hardware slot.
///
/// Entries in the same chain are linked through `link`, which names the next slot of
/// the chain. The chain is owned by its head: only the head is reachable through the
/// table's lookup path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingEntry {
    pub(crate) virtual_page_number: VirtualAddress,
    pub(crate) physical_page_number: PhysicalAddress,
    pub(crate) flags: EntryFlags,
    pub(crate) size_class: SizeClass,
    pub(crate) slot_index: Option<SlotIndex>,
    pub(crate) link: Option<SlotIndex>,
    /// Set once the words have reached the hardware slot. Lookups skip entries
    /// still being filled in between allocation and programming.
    pub(crate) programmed: bool,
}

impl MappingEntry {
    /// An entry not assigned to any slot.
    pub const UNASSIGNED: Self = Self {
        virtual_page_number: VirtualAddress::ZERO,
        physical_page_number: PhysicalAddress::ZERO,
        flags: EntryFlags::empty(),
        size_class: SizeClass::SMALLEST,
        slot_index: None,
        link: None,
        programmed: false,
    };

    /// Creates a freshly allocated entry with zeroed mapping fields.
    pub(crate) const fn assigned(index: SlotIndex) -> Self {
        Self {
            slot_index: Some(index),
            ..Self::UNASSIGNED
        }
    }

    /// Rebuilds an entry from the words read out of a hardware slot.
    pub(crate) const fn from_words(
        index: SlotIndex,
        address: AddressWord,
        data: DataWord,
    ) -> Self {
        Self {
            virtual_page_number: address.page(),
            physical_page_number: data.page(),
            flags: data.flags(),
            size_class: data.size_class(),
            slot_index: Some(index),
            link: None,
            programmed: true,
        }
    }

    /// Returns the virtual base of the block.
    pub const fn virtual_page_number(&self) -> VirtualAddress {
        self.virtual_page_number
    }

    /// Returns the physical base of the block.
    pub const fn physical_page_number(&self) -> PhysicalAddress {
        self.physical_page_number
    }

    /// Returns the cache attributes of the block.
    pub const fn flags(&self) -> EntryFlags {
        self.flags
    }

    /// Returns the block size.
    pub const fn size_class(&self) -> SizeClass {
        self.size_class
    }

    /// Returns the slot holding this entry, or `None` if it is unassigned.
    pub const fn slot_index(&self) -> Option<SlotIndex> {
        self.slot_index
    }

    /// Returns the next slot in this entry's chain.
    pub const fn link(&self) -> Option<SlotIndex> {
        self.link
    }

    /// Returns true once the entry has been written to its hardware slot.
    pub const fn is_programmed(&self) -> bool {
        self.programmed
    }

    /// Returns the last byte of the virtual block as a raw value.
    ///
    /// A block may end at the top of the address space, so the exclusive end is
    /// not representable in a 32-bit `usize`.
    pub const fn virtual_last(&self) -> usize {
        self.virtual_page_number.as_usize() + (self.size_class.bytes() - 1)
    }

    /// Returns the last byte of the physical block as a raw value.
    pub const fn physical_last(&self) -> usize {
        self.physical_page_number.as_usize() + (self.size_class.bytes() - 1)
    }

    /// Returns true if `next` starts exactly where this block ends, virtually and
    /// physically. A block ending at the top of either space has no successor.
    pub fn is_contiguous_with(&self, next: &MappingEntry) -> bool {
        follows(self.virtual_last(), next.virtual_page_number.as_usize())
            && follows(self.physical_last(), next.physical_page_number.as_usize())
    }

    /// Returns true if `virt` falls inside this block.
    pub const fn contains(&self, virt: VirtualAddress) -> bool {
        virt.as_usize()
            .wrapping_sub(self.virtual_page_number.as_usize())
            < self.size_class.bytes()
    }

    /// Returns the address word programming this entry.
    pub const fn address_word(&self) -> AddressWord {
        AddressWord::new(self.virtual_page_number, true)
    }

    /// Returns the data word programming this entry.
    pub const fn data_word(&self) -> DataWord {
        DataWord::new(self.physical_page_number, self.size_class, self.flags, true)
    }
}

fn follows(last: usize, next: usize) -> bool {
    last < MAX_ADDRESS && last + 1 == next
}

impl Default for MappingEntry {
    fn default() -> Self {
        Self::UNASSIGNED
    }
}

/// A snapshot of one chain: a logical contiguous mapping spanning one or more slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    virt: VirtualAddress,
    phys: PhysicalAddress,
    size: u64,
    flags: EntryFlags,
    slots: Vec<SlotIndex>,
}

impl Mapping {
    /// Builds a snapshot from the entries of a chain in head-to-tail order.
    pub(crate) fn from_chain(chain: &[MappingEntry]) -> Option<Self> {
        let head = chain.first()?;
        Some(Self {
            virt: head.virtual_page_number,
            phys: head.physical_page_number,
            size: chain
                .iter()
                .map(|entry| entry.size_class.bytes() as u64)
                .sum(),
            flags: head.flags,
            slots: chain.iter().filter_map(|entry| entry.slot_index).collect(),
        })
    }

    /// Returns the slot at the head of the chain.
    pub fn head(&self) -> SlotIndex {
        self.slots[0]
    }

    /// Returns the virtual base of the mapping.
    pub fn virtual_base(&self) -> VirtualAddress {
        self.virt
    }

    /// Returns the physical base of the mapping.
    pub fn physical_base(&self) -> PhysicalAddress {
        self.phys
    }

    /// Returns the total number of bytes mapped. A chain covering the whole
    /// address space maps 4 GiB, which is why this is not a `usize`.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns the cache attributes of the head entry.
    pub fn flags(&self) -> EntryFlags {
        self.flags
    }

    /// Returns the caller-facing cache policy of the mapping.
    pub fn policy(&self) -> CachePolicy {
        self.flags.policy()
    }

    /// Returns the slots of the chain in head-to-tail order.
    pub fn slots(&self) -> &[SlotIndex] {
        &self.slots
    }

    /// Returns true if `virt` falls inside the mapping.
    pub fn contains(&self, virt: VirtualAddress) -> bool {
        let base = self.virt.as_usize();
        virt.as_usize() >= base && ((virt.as_usize() - base) as u64) < self.size
    }
}
