//! Runtime configuration of a remap table.

use crate::{MemoryRegion, PhysicalAddress};

/// Maximum number of system memory regions a configuration can describe.
pub const MAX_MEMORY_REGIONS: usize = 8;

/// Caching requested by a caller of [`RemapTable::remap`](crate::RemapTable::remap).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Cached using the system-wide [`CacheMode`].
    Cached,
    /// Uncached and unbuffered, for device memory.
    Uncached,
}

/// The system-wide write policy applied to every cached mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Writes are held in the cache and written back on eviction.
    #[default]
    CopyBack,
    /// Writes go to memory immediately.
    WriteThrough,
}

/// Configuration of a [`RemapTable`](crate::RemapTable).
///
/// Built with `const` builder methods so a kernel can keep its configuration in a
/// `static`:
///
/// ```
/// use pmb::{CacheMode, MemoryRegion, PhysicalAddress, TableConfig};
///
/// static CONFIG: TableConfig = TableConfig::new()
///     .with_memory(MemoryRegion::new(PhysicalAddress::new(0x0800_0000), 0x0800_0000))
///     .with_cache_mode(CacheMode::WriteThrough)
///     .with_coalescing(true);
///
/// assert!(CONFIG.is_system_memory(PhysicalAddress::new(0x0C00_0000)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableConfig {
    cache_mode: CacheMode,
    memory: [Option<MemoryRegion>; MAX_MEMORY_REGIONS],
    memory_count: usize,
    coalesce_boot_mappings: bool,
}

impl TableConfig {
    /// Creates a configuration with copy-back caching, no system memory, and no
    /// coalescing.
    pub const fn new() -> Self {
        Self {
            cache_mode: CacheMode::CopyBack,
            memory: [None; MAX_MEMORY_REGIONS],
            memory_count: 0,
            coalesce_boot_mappings: false,
        }
    }

    /// Sets the system-wide cache mode.
    pub const fn with_cache_mode(mut self, cache_mode: CacheMode) -> Self {
        self.cache_mode = cache_mode;
        self
    }

    /// Adds a recognized system memory region.
    ///
    /// # Panics
    ///
    /// Panics if more than [`MAX_MEMORY_REGIONS`] regions are added.
    pub const fn with_memory(mut self, region: MemoryRegion) -> Self {
        assert!(
            self.memory_count < MAX_MEMORY_REGIONS,
            "too many system memory regions"
        );
        self.memory[self.memory_count] = Some(region);
        self.memory_count += 1;
        self
    }

    /// Enables or disables merging of boot-time chains during [`init`](crate::RemapTable::init).
    pub const fn with_coalescing(mut self, enabled: bool) -> Self {
        self.coalesce_boot_mappings = enabled;
        self
    }

    /// Returns the system-wide cache mode.
    pub const fn cache_mode(&self) -> CacheMode {
        self.cache_mode
    }

    /// Returns whether boot-time chains are coalesced during initialization.
    pub const fn coalesce_boot_mappings(&self) -> bool {
        self.coalesce_boot_mappings
    }

    /// Returns an iterator over the recognized system memory regions.
    pub fn memory_regions(&self) -> impl Iterator<Item = &MemoryRegion> {
        self.memory[..self.memory_count]
            .iter()
            .filter_map(|region| region.as_ref())
    }

    /// Returns true if `address` lies in recognized system memory.
    pub fn is_system_memory(&self, address: PhysicalAddress) -> bool {
        self.memory_regions().any(|region| region.contains(address))
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self::new()
    }
}
