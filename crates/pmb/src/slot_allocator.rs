//! Bitmap allocator for the fixed pool of mapping slots.
//!
//! Slot ownership is tracked by a directory of two bitmaps behind a single reader/writer
//! lock: `live` marks allocated slots and `heads` marks the first slot of every chain
//! that has been published to the lookup path. Each slot's shadow entry sits behind its
//! own lock, so programming one slot never holds up the allocation of another.
//!
//! # Lock ordering
//!
//! The directory lock may be held while taking an entry lock, never the reverse.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use crate::{MapError, MappingEntry, SlotHint, SlotIndex};

/// Maximum number of slots a single allocator can track.
pub const MAX_SLOTS: usize = u64::BITS as usize;

/// A set of slots, one bit per slot index.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotBitmap(u64);

impl SlotBitmap {
    /// Creates an empty bitmap.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Returns whether the bit for `index` is set.
    pub const fn test(self, index: SlotIndex) -> bool {
        (self.0 & (1 << index.as_usize())) != 0
    }

    /// Sets the bit for `index`.
    pub fn set(&mut self, index: SlotIndex) {
        self.0 |= 1 << index.as_usize();
    }

    /// Clears the bit for `index`.
    pub fn clear(&mut self, index: SlotIndex) {
        self.0 &= !(1 << index.as_usize());
    }

    /// Returns the lowest clear bit below `capacity`.
    pub fn first_clear(self, capacity: usize) -> Option<SlotIndex> {
        let index = (!self.0).trailing_zeros() as usize;
        (index < capacity).then_some(SlotIndex::new(index))
    }

    /// Returns the number of set bits.
    pub const fn count(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Returns true if no bit is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns the set bits in ascending order.
    pub fn iter(self) -> impl Iterator<Item = SlotIndex> {
        let mut bits = self.0;
        core::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let index = bits.trailing_zeros() as usize;
            bits &= bits - 1;
            Some(SlotIndex::new(index))
        })
    }
}

impl fmt::Debug for SlotBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(SlotIndex::as_usize)).finish()
    }
}

impl FromIterator<SlotIndex> for SlotBitmap {
    fn from_iter<I: IntoIterator<Item = SlotIndex>>(iter: I) -> Self {
        let mut bitmap = Self::empty();
        for index in iter {
            bitmap.set(index);
        }
        bitmap
    }
}

/// Slot membership, protected by the directory lock.
#[derive(Debug, Default)]
struct Directory {
    live: SlotBitmap,
    heads: SlotBitmap,
}

/// Allocator for a fixed pool of mapping slots.
///
/// # Thread Safety
///
/// All bitmap changes happen under the write side of the directory lock, so concurrent
/// callers can never be handed the same slot. Entry contents are guarded by per-slot
/// `spin::Mutex`es.
pub struct SlotAllocator {
    directory: spin::RwLock<Directory>,
    slots: Box<[spin::Mutex<MappingEntry>]>,
}

impl SlotAllocator {
    /// Creates an allocator for `capacity` slots, all free.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` exceeds [`MAX_SLOTS`].
    pub fn new(capacity: usize) -> Self {
        assert!(capacity <= MAX_SLOTS, "slot capacity exceeds bitmap width");
        Self {
            directory: spin::RwLock::new(Directory::default()),
            slots: (0..capacity)
                .map(|_| spin::Mutex::new(MappingEntry::UNASSIGNED))
                .collect(),
        }
    }

    /// Returns the number of slots managed by this allocator.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Allocates a slot and resets its entry.
    ///
    /// With [`SlotHint::Any`] the lowest free slot is chosen; with
    /// [`SlotHint::Exact`] only the named slot is considered.
    pub fn allocate(&self, hint: SlotHint) -> Result<SlotIndex, MapError> {
        let mut directory = self.directory.write();

        let index = match hint {
            SlotHint::Any => directory
                .live
                .first_clear(self.capacity())
                .ok_or(MapError::CapacityExhausted)?,
            SlotHint::Exact(index) => {
                if index.as_usize() >= self.capacity() {
                    return Err(MapError::SlotOutOfRange);
                }
                if directory.live.test(index) {
                    return Err(MapError::SlotBusy);
                }
                index
            }
        };

        directory.live.set(index);
        *self.slots[index.as_usize()].lock() = MappingEntry::assigned(index);

        log::trace!("allocated mapping slot {}", index);
        Ok(index)
    }

    /// Returns a slot to the pool.
    ///
    /// The caller must ensure nothing references the slot, including the link of another
    /// entry.
    pub fn free(&self, index: SlotIndex) {
        let mut directory = self.directory.write();
        directory.live.clear(index);
        directory.heads.clear(index);

        let mut entry = self.slots[index.as_usize()].lock();
        entry.slot_index = None;
        entry.link = None;
        entry.programmed = false;

        log::trace!("freed mapping slot {}", index);
    }

    /// Locks and returns the shadow entry of a slot.
    ///
    /// The directory lock must not be taken while the returned guard is alive.
    pub fn entry(&self, index: SlotIndex) -> spin::MutexGuard<'_, MappingEntry> {
        self.slots[index.as_usize()].lock()
    }

    /// Returns whether a slot is allocated.
    pub fn is_live(&self, index: SlotIndex) -> bool {
        index.as_usize() < self.capacity() && self.directory.read().live.test(index)
    }

    /// Returns the set of allocated slots.
    pub fn live(&self) -> SlotBitmap {
        self.directory.read().live
    }

    /// Returns the set of published chain heads.
    pub fn heads(&self) -> SlotBitmap {
        self.directory.read().heads
    }

    /// Makes a finished chain visible to the lookup path.
    pub(crate) fn publish(&self, head: SlotIndex) {
        self.directory.write().heads.set(head);
    }

    /// Replaces the head marks of `scope` with `heads`, leaving other slots untouched.
    pub(crate) fn republish(&self, scope: SlotBitmap, heads: SlotBitmap) {
        let mut directory = self.directory.write();
        directory.heads = SlotBitmap((directory.heads.0 & !scope.0) | (heads.0 & scope.0));
    }

    /// Finds the first published head matching `predicate` in slot order and withdraws it
    /// from the lookup path, handing the chain to the caller.
    pub(crate) fn take_head(
        &self,
        predicate: impl Fn(&MappingEntry) -> bool,
    ) -> Option<SlotIndex> {
        let mut directory = self.directory.write();
        let head = directory
            .heads
            .iter()
            .find(|&head| predicate(&*self.slots[head.as_usize()].lock()))?;
        directory.heads.clear(head);
        Some(head)
    }

    /// Returns a copy of the first programmed live entry matching `predicate` in slot
    /// order.
    pub(crate) fn find_live(
        &self,
        predicate: impl Fn(&MappingEntry) -> bool,
    ) -> Option<MappingEntry> {
        let directory = self.directory.read();
        directory
            .live
            .iter()
            .map(|index| *self.slots[index.as_usize()].lock())
            .find(|entry| entry.programmed && predicate(entry))
    }

    /// Collects every published chain, head to tail, while frees are held off.
    pub(crate) fn chains(&self) -> Vec<Vec<MappingEntry>> {
        let directory = self.directory.read();
        directory
            .heads
            .iter()
            .map(|head| self.walk(head))
            .collect()
    }

    /// Calls `f` with every programmed live entry in slot order while frees are held
    /// off.
    pub(crate) fn for_each_live(&self, mut f: impl FnMut(&MappingEntry)) {
        let directory = self.directory.read();
        for index in directory.live.iter() {
            let entry = self.slots[index.as_usize()].lock();
            if entry.programmed {
                f(&*entry);
            }
        }
    }

    /// Copies the directory and every entry while allocation is held off.
    pub(crate) fn snapshot(&self) -> (SlotBitmap, SlotBitmap, Vec<MappingEntry>) {
        let directory = self.directory.read();
        let entries = self.slots.iter().map(|slot| *slot.lock()).collect();
        (directory.live, directory.heads, entries)
    }

    /// Copies the entries of the chain starting at `head`, one entry lock at a time.
    pub(crate) fn walk(&self, head: SlotIndex) -> Vec<MappingEntry> {
        let mut chain = Vec::new();
        let mut next = Some(head);
        while let Some(index) = next {
            let entry = *self.slots[index.as_usize()].lock();
            next = entry.link;
            chain.push(entry);
        }
        chain
    }
}
