//! The remap table: region mapping on top of the slot allocator.
//!
//! A [`RemapTable`] owns the slot allocator and the register backend of one hardware
//! mapping table. Requests of arbitrary length are decomposed greedily into the largest
//! blocks that fit, one slot per block, and the slots of a request are linked into a
//! chain so the whole region can be torn down by its virtual base.
//!
//! # Hardware hazards
//!
//! Every slot write takes effect immediately. Callers of [`RemapTable::remap`],
//! [`RemapTable::unmap`], [`RemapTable::coalesce`], and [`RemapTable::resume`] must not
//! be executing from, or accessing, memory through a mapping being modified. This
//! cannot be checked here and is undefined behavior at the hardware level.

use alloc::vec::Vec;

use crate::arch::{AddressWord, DataWord, EntryFlags, PAGE_SIZE, SlotRegisters};
use crate::dump::TableDump;
use crate::{
    CachePolicy, MapError, Mapping, MappingEntry, PhysicalAddress, SizeClass, SlotAllocator,
    SlotBitmap, SlotHint, SlotIndex, SyncError, TableConfig, VirtualAddress,
};

/// A hardware mapping table and its software shadow.
pub struct RemapTable<R: SlotRegisters> {
    registers: R,
    config: TableConfig,
    slots: SlotAllocator,
}

impl<R: SlotRegisters> RemapTable<R> {
    /// Creates a table over `registers` with every slot free.
    ///
    /// Hardware state is neither read nor modified. Use [`init`](Self::init) to adopt
    /// the mappings left behind by the boot loader.
    ///
    /// # Panics
    ///
    /// Panics if the register backend reports more than [`MAX_SLOTS`](crate::MAX_SLOTS)
    /// slots.
    pub fn new(registers: R, config: TableConfig) -> Self {
        let slots = SlotAllocator::new(registers.capacity());
        Self {
            registers,
            config,
            slots,
        }
    }

    /// Creates a table and brings it in sync with hardware.
    ///
    /// Valid boot-time mappings of system memory are imported (and coalesced if the
    /// configuration asks for it); stale ones are cleared. If nothing valid is found,
    /// every hardware slot is cleared and the table starts empty.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`new`](Self::new).
    pub fn init(registers: R, config: TableConfig) -> Self {
        let table = Self::new(registers, config);

        match table.synchronize() {
            Ok(imported) => {
                log::debug!("imported {} boot mapping slots", imported);
                if table.config.coalesce_boot_mappings() {
                    let released = table.coalesce();
                    if released > 0 {
                        log::debug!("coalescing released {} slots", released);
                    }
                }
            }
            Err(SyncError::AllSlotsInvalid) => {
                log::info!("no valid boot mappings, starting with an empty table");
                table.clear_hardware();
            }
        }

        table.log_mappings();
        table
    }

    /// Returns the register backend.
    pub fn registers(&self) -> &R {
        &self.registers
    }

    /// Returns the table configuration.
    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Returns the number of slots in the table.
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Returns the slot allocator backing this table.
    pub fn slots(&self) -> &SlotAllocator {
        &self.slots
    }

    /// Maps `length` bytes at `virt` onto `phys`.
    ///
    /// Both addresses are aligned down to the hardware page size, and the length grows
    /// by the amount cut off. The aligned range is then covered with the largest blocks
    /// that fit, one slot each, linked into a chain.
    ///
    /// Returns the number of bytes mapped from the aligned virtual base. This falls
    /// short of the aligned length when the tail is smaller than the smallest block;
    /// callers needing exact coverage must compare.
    ///
    /// If a slot cannot be allocated, every slot taken for this request is cleared and
    /// freed before the error is returned.
    pub fn remap(
        &self,
        virt: VirtualAddress,
        phys: PhysicalAddress,
        length: usize,
        policy: CachePolicy,
    ) -> Result<usize, MapError> {
        if length == 0 {
            return Err(MapError::InvalidLength);
        }
        if virt.page_offset() != phys.page_offset() {
            return Err(MapError::OffsetMismatch);
        }

        let requested = length
            .checked_add(virt.page_offset())
            .ok_or(MapError::InvalidLength)?;
        let mut virt = virt.align_down(PAGE_SIZE);
        let mut phys = phys.align_down(PAGE_SIZE);

        let mappable = requested & !(SizeClass::SMALLEST.bytes() - 1);
        if mappable == 0 {
            return Err(MapError::InvalidLength);
        }
        if virt.checked_add(mappable - 1).is_none() || phys.checked_add(mappable - 1).is_none()
        {
            return Err(MapError::InvalidLength);
        }
        if self.overlaps(virt, mappable) {
            return Err(MapError::VirtualOverlap);
        }

        let flags = EntryFlags::for_policy(policy, self.config.cache_mode());
        let base = virt;
        let mut remaining = requested;
        let mut head: Option<SlotIndex> = None;
        let mut tail: Option<SlotIndex> = None;

        for size in SizeClass::DESCENDING {
            while remaining >= size.bytes() {
                let index = match self.slots.allocate(SlotHint::Any) {
                    Ok(index) => index,
                    Err(error) => {
                        if let Some(head) = head {
                            let released = self.release_chain(head);
                            log::debug!(
                                "remap of {} failed ({}), rolled back {} slots",
                                base,
                                error,
                                released
                            );
                        }
                        return Err(error);
                    }
                };

                self.program(index, |entry| {
                    entry.virtual_page_number = virt;
                    entry.physical_page_number = phys;
                    entry.flags = flags;
                    entry.size_class = size;
                });

                match tail {
                    Some(previous) => self.slots.entry(previous).link = Some(index),
                    None => head = Some(index),
                }
                tail = Some(index);

                remaining -= size.bytes();
                if remaining >= SizeClass::SMALLEST.bytes() {
                    virt = virt + size.bytes();
                    phys = phys + size.bytes();
                }
            }
        }

        if let Some(head) = head {
            self.slots.publish(head);
        }

        let mapped = requested - remaining;
        if remaining != 0 {
            log::debug!(
                "partial mapping at {}: {} of {} bytes",
                base,
                mapped,
                requested
            );
        }
        log::trace!("mapped {:#x} bytes at {}", mapped, base);
        Ok(mapped)
    }

    /// Tears down the mapping whose virtual base is `virt`.
    ///
    /// `virt` is aligned down to the hardware page size before the lookup. Returns false
    /// if no mapping starts there.
    pub fn unmap(&self, virt: VirtualAddress) -> bool {
        let virt = virt.align_down(PAGE_SIZE);
        let Some(head) = self
            .slots
            .take_head(|entry| entry.virtual_page_number == virt)
        else {
            return false;
        };

        let released = self.release_chain(head);
        log::trace!("unmapped {} ({} slots)", virt, released);
        true
    }

    /// Translates a virtual address through the live entries.
    pub fn translate(&self, virt: VirtualAddress) -> Option<PhysicalAddress> {
        let entry = self.slots.find_live(|entry| entry.contains(virt))?;
        Some(entry.physical_page_number + (virt - entry.virtual_page_number))
    }

    /// Returns the mapping containing `virt`, if any.
    pub fn mapping(&self, virt: VirtualAddress) -> Option<Mapping> {
        self.mappings()
            .into_iter()
            .find(|mapping| mapping.contains(virt))
    }

    /// Returns every published mapping in head slot order.
    pub fn mappings(&self) -> Vec<Mapping> {
        self.slots
            .chains()
            .iter()
            .filter_map(|chain| Mapping::from_chain(chain))
            .collect()
    }

    /// Returns a copy of a live slot's entry.
    pub fn entry(&self, index: SlotIndex) -> Option<MappingEntry> {
        if !self.slots.is_live(index) {
            return None;
        }
        let entry = *self.slots.entry(index);
        entry.slot_index.map(|_| entry)
    }

    /// Returns whether a slot is allocated.
    pub fn is_live(&self, index: SlotIndex) -> bool {
        self.slots.is_live(index)
    }

    /// Returns the set of allocated slots.
    pub fn live_slots(&self) -> SlotBitmap {
        self.slots.live()
    }

    /// Writes every live entry back to hardware in slot order.
    ///
    /// Called after a power transition that lost the hardware table. No slot is
    /// allocated or freed; the software shadow is the source of truth.
    pub fn resume(&self) {
        let mut replayed = 0;
        self.slots.for_each_live(|entry| {
            if let Some(index) = entry.slot_index {
                self.registers
                    .write_slot(index, entry.address_word(), entry.data_word());
                replayed += 1;
            }
        });
        log::debug!("resume replayed {} mapping slots", replayed);
    }

    /// Returns a printable view of the table.
    pub fn dump(&self) -> TableDump<'_, R> {
        TableDump::new(self)
    }

    /// Fills in a freshly allocated entry and writes it to hardware, under the entry lock.
    pub(crate) fn program(&self, index: SlotIndex, update: impl FnOnce(&mut MappingEntry)) {
        let mut entry = self.slots.entry(index);
        update(&mut *entry);
        entry.programmed = true;
        self.registers
            .write_slot(index, entry.address_word(), entry.data_word());
    }

    /// Invalidates and frees every slot of the chain starting at `head`, head first.
    ///
    /// The chain must already be unreachable from the lookup path. Returns the number of
    /// slots released.
    pub(crate) fn release_chain(&self, head: SlotIndex) -> usize {
        let mut released = 0;
        let mut next = Some(head);
        while let Some(index) = next {
            next = {
                let entry = self.slots.entry(index);
                self.registers.write_slot(
                    index,
                    entry.address_word().with_valid(false),
                    entry.data_word().with_valid(false),
                );
                entry.link
            };
            self.slots.free(index);
            released += 1;
        }
        released
    }

    /// Returns true if `[virt, virt + length)` intersects any live entry.
    fn overlaps(&self, virt: VirtualAddress, length: usize) -> bool {
        let first = virt.as_usize();
        let last = first + (length - 1);
        self.slots
            .find_live(|entry| {
                let base = entry.virtual_page_number.as_usize();
                first <= base + (entry.size_class.bytes() - 1) && base <= last
            })
            .is_some()
    }

    /// Invalidates every hardware slot.
    fn clear_hardware(&self) {
        for index in (0..self.capacity()).map(SlotIndex::new) {
            self.registers
                .write_slot(index, AddressWord::default(), DataWord::default());
        }
    }

    /// Logs every published mapping.
    fn log_mappings(&self) {
        let mappings = self.mappings();
        if mappings.is_empty() {
            return;
        }

        log::info!("boot mappings:");
        for mapping in mappings {
            log::info!(
                "  {} -> {} [ {:4}MiB {} ]",
                mapping.virtual_base(),
                mapping.physical_base(),
                mapping.size() >> 20,
                match mapping.policy() {
                    CachePolicy::Cached => "cached",
                    CachePolicy::Uncached => "uncached",
                }
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::EmulatedRegisters;
    use crate::{CacheMode, MemoryRegion};

    const MIB: usize = 1 << 20;

    fn config() -> TableConfig {
        TableConfig::new().with_memory(MemoryRegion::new(PhysicalAddress::new(0), 1 << 31))
    }

    fn table(capacity: usize) -> RemapTable<EmulatedRegisters> {
        RemapTable::new(EmulatedRegisters::new(capacity), config())
    }

    fn chain_sizes(table: &RemapTable<EmulatedRegisters>, head: SlotIndex) -> Vec<SizeClass> {
        table
            .slots()
            .walk(head)
            .iter()
            .map(MappingEntry::size_class)
            .collect()
    }

    #[test]
    fn maps_largest_blocks_first() {
        let table = table(4);
        let mapped = table
            .remap(VirtualAddress::ZERO, PhysicalAddress::ZERO, 80 * MIB, CachePolicy::Cached)
            .unwrap();

        assert_eq!(mapped, 80 * MIB);
        assert_eq!(table.live_slots().count(), 2);
        assert_eq!(
            chain_sizes(&table, SlotIndex::new(0)),
            vec![SizeClass::Size64M, SizeClass::Size16M]
        );
    }

    #[test]
    fn failed_remap_leaks_nothing() {
        let table = table(4);
        table
            .remap(VirtualAddress::ZERO, PhysicalAddress::ZERO, 80 * MIB, CachePolicy::Cached)
            .unwrap();
        let live_before = table.live_slots();
        let hardware_before = table.registers().snapshot();

        // 100 MiB aligns down to 96 MiB; 604 MiB needs 512 + 64 + 16 and more.
        let result = table.remap(
            VirtualAddress::new(100 * MIB),
            PhysicalAddress::new(100 * MIB),
            600 * MIB,
            CachePolicy::Cached,
        );

        assert_eq!(result, Err(MapError::CapacityExhausted));
        assert_eq!(table.live_slots(), live_before);
        assert_eq!(table.slots().heads().count(), 1);
        for (index, (address, data)) in table.registers().snapshot().into_iter().enumerate() {
            assert_eq!(address.is_valid(), hardware_before[index].0.is_valid());
            assert_eq!(data.is_valid(), hardware_before[index].1.is_valid());
        }
    }

    #[test]
    fn chains_are_contiguous() {
        let table = table(16);
        let virt = VirtualAddress::new(0x8000_0000);
        let phys = PhysicalAddress::new(0x0800_0000);
        let mapped = table
            .remap(virt, phys, 720 * MIB, CachePolicy::Cached)
            .unwrap();
        assert_eq!(mapped, 720 * MIB);

        let mapping = table.mapping(virt).unwrap();
        let chain = table.slots().walk(mapping.head());
        assert_eq!(
            chain.iter().map(MappingEntry::size_class).collect::<Vec<_>>(),
            vec![SizeClass::Size512M, SizeClass::Size128M, SizeClass::Size64M, SizeClass::Size16M]
        );
        assert_eq!(chain[0].virtual_page_number(), virt);
        assert_eq!(chain[0].physical_page_number(), phys);
        for pair in chain.windows(2) {
            assert!(pair[0].is_contiguous_with(&pair[1]));
            assert_eq!(pair[0].link(), pair[1].slot_index());
        }
        assert_eq!(chain.last().unwrap().link(), None);
    }

    #[test]
    fn remap_programs_hardware_immediately() {
        let table = table(4);
        table
            .remap(
                VirtualAddress::new(0xA000_0000),
                PhysicalAddress::new(0x1000_0000),
                16 * MIB,
                CachePolicy::Uncached,
            )
            .unwrap();

        let (address, data) = table.registers().read_slot(SlotIndex::new(0));
        assert!(address.is_valid() && data.is_valid());
        assert_eq!(address.page(), VirtualAddress::new(0xA000_0000));
        assert_eq!(data.page(), PhysicalAddress::new(0x1000_0000));
        assert!(data.flags().is_unbuffered());
        assert!(!data.flags().is_cacheable());
        assert_eq!(table.registers().write_count(), 1);
    }

    #[test]
    fn round_trip_restores_the_bitmap() {
        let table = table(8);
        table
            .remap(VirtualAddress::ZERO, PhysicalAddress::ZERO, 16 * MIB, CachePolicy::Cached)
            .unwrap();
        let before = table.live_slots();

        let virt = VirtualAddress::new(0x8000_0000);
        table
            .remap(virt, PhysicalAddress::new(0x0800_0000), 208 * MIB, CachePolicy::Cached)
            .unwrap();
        assert_eq!(table.live_slots().count(), 4);

        assert!(table.unmap(virt));
        assert_eq!(table.live_slots(), before);
        for index in (1..8).map(SlotIndex::new) {
            let (address, data) = table.registers().read_slot(index);
            assert!(!address.is_valid() && !data.is_valid());
        }
    }

    #[test]
    fn unmap_unknown_region_is_a_no_op() {
        let table = table(4);
        table
            .remap(VirtualAddress::ZERO, PhysicalAddress::ZERO, 80 * MIB, CachePolicy::Cached)
            .unwrap();
        let writes = table.registers().write_count();

        // The second block of a chain is not a head.
        assert!(!table.unmap(VirtualAddress::new(64 * MIB)));
        assert!(!table.unmap(VirtualAddress::new(0x8000_0000)));
        assert_eq!(table.live_slots().count(), 2);
        assert_eq!(table.registers().write_count(), writes);
    }

    #[test]
    fn partial_mapping_returns_short_length() {
        let table = table(4);
        let mapped = table
            .remap(VirtualAddress::ZERO, PhysicalAddress::ZERO, 90 * MIB, CachePolicy::Cached)
            .unwrap();
        assert_eq!(mapped, 80 * MIB);
    }

    #[test]
    fn unaligned_requests_are_aligned_down() {
        let table = table(4);
        let mapped = table
            .remap(
                VirtualAddress::new(0x8000_0000 + 4 * MIB),
                PhysicalAddress::new(0x0800_0000 + 4 * MIB),
                60 * MIB,
                CachePolicy::Cached,
            )
            .unwrap();
        assert_eq!(mapped, 64 * MIB);
        assert_eq!(
            table.translate(VirtualAddress::new(0x8000_0000 + 4 * MIB)),
            Some(PhysicalAddress::new(0x0800_0000 + 4 * MIB))
        );
        assert!(table.unmap(VirtualAddress::new(0x8000_0000 + 4 * MIB)));
        assert!(table.live_slots().is_empty());
    }

    #[test]
    fn rejects_unmappable_requests() {
        let table = table(4);
        let virt = VirtualAddress::new(0x8000_0000);
        let phys = PhysicalAddress::new(0x0800_0000);

        assert_eq!(
            table.remap(virt, phys, 0, CachePolicy::Cached),
            Err(MapError::InvalidLength)
        );
        assert_eq!(
            table.remap(virt, phys, 15 * MIB, CachePolicy::Cached),
            Err(MapError::InvalidLength)
        );
        assert_eq!(
            table.remap(virt, phys + MIB, 16 * MIB, CachePolicy::Cached),
            Err(MapError::OffsetMismatch)
        );
        assert_eq!(
            table.remap(
                VirtualAddress::new(0xF000_0000),
                phys,
                512 * MIB,
                CachePolicy::Cached
            ),
            Err(MapError::InvalidLength)
        );
        assert!(table.live_slots().is_empty());
        assert_eq!(table.registers().write_count(), 0);
    }

    #[test]
    fn rejects_overlapping_requests() {
        let table = table(8);
        table
            .remap(
                VirtualAddress::new(0x8000_0000),
                PhysicalAddress::new(0x0800_0000),
                64 * MIB,
                CachePolicy::Cached,
            )
            .unwrap();

        assert_eq!(
            table.remap(
                VirtualAddress::new(0x8300_0000),
                PhysicalAddress::new(0x2000_0000),
                32 * MIB,
                CachePolicy::Cached
            ),
            Err(MapError::VirtualOverlap)
        );
        // Directly adjacent is fine.
        assert!(
            table
                .remap(
                    VirtualAddress::new(0x8400_0000),
                    PhysicalAddress::new(0x2000_0000),
                    16 * MIB,
                    CachePolicy::Cached
                )
                .is_ok()
        );
    }

    #[test]
    fn maps_up_to_the_top_of_the_address_space() {
        let table = table(4);
        let mapped = table
            .remap(
                VirtualAddress::new(0xE000_0000),
                PhysicalAddress::new(0x2000_0000),
                512 * MIB,
                CachePolicy::Cached,
            )
            .unwrap();
        assert_eq!(mapped, 512 * MIB);
        assert_eq!(
            table.translate(VirtualAddress::new(0xFFFF_FFFF)),
            Some(PhysicalAddress::new(0x3FFF_FFFF))
        );
    }

    #[test]
    fn translate_walks_every_block() {
        let table = table(4);
        table
            .remap(
                VirtualAddress::new(0x8000_0000),
                PhysicalAddress::new(0x0800_0000),
                80 * MIB,
                CachePolicy::Cached,
            )
            .unwrap();
        assert_eq!(
            table.translate(VirtualAddress::new(0x8000_1234)),
            Some(PhysicalAddress::new(0x0800_1234))
        );
        assert_eq!(
            table.translate(VirtualAddress::new(0x8480_0000)),
            Some(PhysicalAddress::new(0x0C80_0000))
        );
        assert_eq!(table.translate(VirtualAddress::new(0x8500_0000)), None);
    }

    #[test]
    fn write_through_mode_applies_to_cached_mappings() {
        let table = RemapTable::new(
            EmulatedRegisters::new(4),
            config().with_cache_mode(CacheMode::WriteThrough),
        );
        table
            .remap(VirtualAddress::ZERO, PhysicalAddress::ZERO, 16 * MIB, CachePolicy::Cached)
            .unwrap();
        let entry = table.entry(SlotIndex::new(0)).unwrap();
        assert!(entry.flags().is_cacheable());
        assert!(entry.flags().is_write_through());
    }

    #[test]
    fn resume_replays_live_entries() {
        let table = table(4);
        table
            .remap(VirtualAddress::ZERO, PhysicalAddress::ZERO, 80 * MIB, CachePolicy::Cached)
            .unwrap();
        let before = table.registers().snapshot();

        table.registers().reset();
        table.resume();

        assert_eq!(table.registers().snapshot(), before);
        assert_eq!(table.live_slots().count(), 2);
    }

    #[test]
    fn entry_is_none_for_free_slots() {
        let table = table(4);
        assert_eq!(table.entry(SlotIndex::new(0)), None);
        assert_eq!(table.entry(SlotIndex::new(9)), None);
    }

    #[test]
    #[should_panic(expected = "slot capacity exceeds bitmap width")]
    fn rejects_backends_wider_than_the_bitmap() {
        table(crate::MAX_SLOTS + 1);
    }

    #[test]
    fn allocated_but_unprogrammed_slots_are_invisible() {
        let table = table(4);
        let pending = table.slots().allocate(SlotHint::Any).unwrap();

        assert_eq!(table.translate(VirtualAddress::new(MIB)), None);
        assert_eq!(table.mapping(VirtualAddress::ZERO), None);
        assert_eq!(
            table.remap(VirtualAddress::ZERO, PhysicalAddress::ZERO, 16 * MIB, CachePolicy::Cached),
            Ok(16 * MIB)
        );
        assert_eq!(table.translate(VirtualAddress::new(MIB)), Some(PhysicalAddress::new(MIB)));

        table.registers().reset();
        table.resume();
        let (address, _) = table.registers().read_slot(pending);
        assert!(!address.is_valid());
    }

    #[test]
    fn concurrent_remaps_get_disjoint_slots() {
        use std::sync::Arc;

        let table = Arc::new(table(16));
        let threads: Vec<_> = (0..4)
            .map(|thread| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || {
                    let virt = VirtualAddress::new(0x8000_0000 + thread * 0x1000_0000);
                    let phys = PhysicalAddress::new(thread * 0x1000_0000);
                    for _ in 0..100 {
                        assert_eq!(
                            table.remap(virt, phys, 80 * MIB, CachePolicy::Cached),
                            Ok(80 * MIB)
                        );
                        assert_eq!(table.translate(virt + MIB), Some(phys + MIB));
                        assert!(table.unmap(virt));
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        assert!(table.live_slots().is_empty());
        assert!(table.slots().heads().is_empty());
    }
}
