#![cfg_attr(not(any(test, feature = "software-emulation")), no_std)]

//! # Polaris Mapping Buffer (PMB)
//!
//! The Polaris Mapping Buffer is a low-level crate managing a small, fixed-capacity
//! hardware table that remaps regions of a 32-bit virtual address space onto physical
//! memory. It provides:
//!
//! - Bitmap allocation of table slots, safe to call from several CPUs at once.
//! - Greedy decomposition of arbitrary regions into 512, 128, 64, and 16 MiB blocks,
//!   linked into chains and rolled back atomically on failure.
//! - Adoption of the mappings left in hardware by the boot loader.
//! - Replay of the table after a power transition and a diagnostic dump.
//! - Software emulation of the register arrays for testing in non-kernel environments.

extern crate alloc;

mod address;
pub mod arch;
mod config;
mod dump;
mod entry;
mod error;
mod memory;
mod remap_table;
mod size_class;
mod slot_allocator;
mod synchronize;

pub use address::{PhysicalAddress, VirtualAddress};
pub use config::{CacheMode, CachePolicy, MAX_MEMORY_REGIONS, TableConfig};
pub use dump::TableDump;
pub use entry::{Mapping, MappingEntry, SlotHint, SlotIndex};
pub use error::{MapError, SyncError};
pub use memory::MemoryRegion;
pub use remap_table::RemapTable;
pub use size_class::SizeClass;
pub use slot_allocator::{MAX_SLOTS, SlotAllocator, SlotBitmap};

#[cfg(any(test, feature = "software-emulation"))]
pub use arch::EmulatedRegisters;
pub use arch::{AddressWord, DataWord, EntryFlags, MmioRegisters, PAGE_SIZE, SlotRegisters};
