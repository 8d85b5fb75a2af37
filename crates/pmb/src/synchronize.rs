//! Adoption of mappings left in hardware by the boot loader.
//!
//! The boot loader programs the table before handing over control, and the kernel is
//! already running through some of those mappings. [`RemapTable::synchronize`] reads
//! every slot back, drops the ones that point outside system memory, and rebuilds the
//! software shadow so those slots are never handed out twice.
//!
//! Hardware keeps no record of which slots belong together. Chains are reconstructed by
//! linking each imported entry to the previous one when the two are contiguous both
//! virtually and physically. Two unrelated boot mappings that happen to be adjacent are
//! therefore merged into one chain and torn down together.

use crate::arch::{EntryFlags, SlotRegisters};
use crate::{
    CachePolicy, MapError, MappingEntry, RemapTable, SizeClass, SlotBitmap, SlotHint,
    SlotIndex, SyncError,
};

impl<R: SlotRegisters> RemapTable<R> {
    /// Imports every valid hardware slot into the software shadow.
    ///
    /// Slots with either valid bit clear are skipped without being touched. Slots whose
    /// physical page lies outside system memory are invalidated in hardware and not
    /// imported. Cacheable slots are rewritten with the configured cache mode if they
    /// disagree with it.
    ///
    /// Slots that are already live are adopted again, so running this twice against the
    /// same hardware leaves the table unchanged.
    ///
    /// Returns the number of slots imported.
    pub fn synchronize(&self) -> Result<usize, SyncError> {
        let cached = EntryFlags::for_policy(CachePolicy::Cached, self.config().cache_mode());

        let mut imported = 0;
        let mut scope = SlotBitmap::empty();
        let mut heads = SlotBitmap::empty();
        let mut previous: Option<MappingEntry> = None;

        for index in (0..self.capacity()).map(SlotIndex::new) {
            let (address, mut data) = self.registers().read_slot(index);
            if !address.is_valid() || !data.is_valid() {
                continue;
            }

            if !self.config().is_system_memory(data.page()) {
                log::warn!(
                    "slot {}: clearing stale mapping {} -> {}",
                    index,
                    address.page(),
                    data.page()
                );
                self.registers().clear_slot(index);
                continue;
            }

            if data.flags().is_cacheable() && data.flags() != cached {
                log::debug!(
                    "slot {}: cache flags {} -> {}",
                    index,
                    data.flags().label(),
                    cached.label()
                );
                data = data.with_flags(cached);
                self.registers().write_slot(index, address, data);
            }

            match self.slots().allocate(SlotHint::Exact(index)) {
                Ok(_) | Err(MapError::SlotBusy) => {}
                Err(error) => {
                    log::error!("slot {}: cannot import ({})", index, error);
                    continue;
                }
            }

            let entry = MappingEntry::from_words(index, address, data);
            *self.slots().entry(index) = entry;
            scope.set(index);

            let linked = previous
                .filter(|prev| prev.is_contiguous_with(&entry))
                .and_then(|prev| prev.slot_index);
            match linked {
                Some(prev) => self.slots().entry(prev).link = Some(index),
                None => heads.set(index),
            }

            log::trace!(
                "slot {}: imported {} -> {} ({})",
                index,
                entry.virtual_page_number(),
                entry.physical_page_number(),
                entry.size_class()
            );
            previous = Some(entry);
            imported += 1;
        }

        self.slots().republish(scope, heads);

        if imported == 0 {
            return Err(SyncError::AllSlotsInvalid);
        }
        Ok(imported)
    }

    /// Merges chains that a single larger block can cover into that block.
    ///
    /// A chain qualifies when its total size is exactly one size class, both of its
    /// bases are aligned to that size, and all of its entries share cache flags. The
    /// tail slots are invalidated and freed before the head is widened, so the two
    /// never overlap in hardware.
    ///
    /// Returns the number of slots released.
    pub fn coalesce(&self) -> usize {
        let mut released = 0;

        for chain in self.slots().chains() {
            let Some(size) = merged_size(&chain) else {
                continue;
            };
            let Some(head) = chain[0].slot_index else {
                continue;
            };

            let Some(head) = self
                .slots()
                .take_head(|entry| entry.slot_index == Some(head))
            else {
                continue;
            };
            if self.slots().walk(head) != chain {
                self.slots().publish(head);
                continue;
            }

            let tail = self.slots().entry(head).link.take();
            let freed = tail.map_or(0, |tail| self.release_chain(tail));

            self.program(head, |entry| {
                entry.size_class = size;
                entry.link = None;
            });
            self.slots().publish(head);

            log::debug!(
                "coalesced {} slots at {} into one {} block",
                freed + 1,
                chain[0].virtual_page_number(),
                size
            );
            released += freed;
        }

        released
    }
}

/// Returns the single block size that can replace `chain`, if any.
fn merged_size(chain: &[MappingEntry]) -> Option<SizeClass> {
    let (head, rest) = chain.split_first()?;
    if rest.is_empty() || rest.iter().any(|entry| entry.flags != head.flags) {
        return None;
    }

    let total = chain
        .iter()
        .try_fold(0usize, |total, entry| total.checked_add(entry.size_class.bytes()))?;
    let size = SizeClass::exact(total)?;
    let aligned = head.virtual_page_number.is_aligned(size.bytes())
        && head.physical_page_number.is_aligned(size.bytes());
    aligned.then_some(size)
}
