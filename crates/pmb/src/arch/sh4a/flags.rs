//! Cache attribute bits of a PMB data word.

use crate::{CacheMode, CachePolicy};

/// Cache and buffering attributes of a slot, in data word format.
///
/// Only the attribute bits are kept; the valid bit, page number, and size bits of the
/// data word are tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryFlags(u32);

impl EntryFlags {
    /// Write-through bit (bit 0). Only meaningful together with `CACHEABLE`.
    const WRITE_THROUGH: u32 = 1 << 0;

    /// Cacheable bit (bit 3).
    const CACHEABLE: u32 = 1 << 3;

    /// Unbuffered bit (bit 9). Writes complete before the next access is issued.
    const UNBUFFERED: u32 = 1 << 9;

    /// Every attribute bit.
    pub const MASK: u32 = Self::WRITE_THROUGH | Self::CACHEABLE | Self::UNBUFFERED;

    /// Creates empty flags (uncached, buffered).
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Creates flags from raw data word bits, discarding non-attribute bits.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw & Self::MASK)
    }

    /// Returns the raw data word bits of these flags.
    pub const fn to_raw(self) -> u32 {
        self.0
    }

    /// Returns the attributes that implement `policy` under the system cache `mode`.
    pub const fn for_policy(policy: CachePolicy, mode: CacheMode) -> Self {
        match (policy, mode) {
            (CachePolicy::Cached, CacheMode::CopyBack) => Self(Self::CACHEABLE),
            (CachePolicy::Cached, CacheMode::WriteThrough) => {
                Self(Self::CACHEABLE | Self::WRITE_THROUGH)
            }
            (CachePolicy::Uncached, _) => Self(Self::UNBUFFERED),
        }
    }

    /// Returns the caller-facing policy these attributes implement.
    pub const fn policy(self) -> CachePolicy {
        if self.is_cacheable() {
            CachePolicy::Cached
        } else {
            CachePolicy::Uncached
        }
    }

    /// Returns whether the cacheable bit is set.
    pub const fn is_cacheable(self) -> bool {
        (self.0 & Self::CACHEABLE) != 0
    }

    /// Returns whether the write-through bit is set.
    pub const fn is_write_through(self) -> bool {
        (self.0 & Self::WRITE_THROUGH) != 0
    }

    /// Returns whether the unbuffered bit is set.
    pub const fn is_unbuffered(self) -> bool {
        (self.0 & Self::UNBUFFERED) != 0
    }

    /// Short cache attribute label used by the table dump.
    pub const fn label(self) -> &'static str {
        match (self.is_cacheable(), self.is_write_through()) {
            (true, true) => "C/WT",
            (true, false) => "C/CB",
            (false, _) => "UC",
        }
    }
}
