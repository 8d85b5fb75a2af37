//! Diagnostic dump of a remap table.

use core::fmt;

use crate::arch::SlotRegisters;
use crate::{RemapTable, SlotIndex};

/// A printable view of every slot of a [`RemapTable`].
///
/// The software state is copied under the directory lock when the view is formatted,
/// so each line reflects a consistent snapshot. Hardware validity is read alongside.
///
/// ```text
/// V: hardware valid, H: chain head, C: cacheable, WT: write-through, CB: copy-back
/// UC: uncached, B: buffered, UB: unbuffered
///
/// slot  state  vpn         ppn         size    cache  buf  link
///   00  V H    0x80000000  0x08000000  64MiB   C/CB   B    01
///   01  V      0x84000000  0x0c000000  16MiB   C/CB   B    --
///   02  -      ----------  ----------  ------  -----  ---  --
/// ```
pub struct TableDump<'a, R: SlotRegisters> {
    table: &'a RemapTable<R>,
}

impl<'a, R: SlotRegisters> TableDump<'a, R> {
    pub(crate) fn new(table: &'a RemapTable<R>) -> Self {
        Self { table }
    }
}

impl<R: SlotRegisters> fmt::Display for TableDump<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (live, heads, entries) = self.table.slots().snapshot();

        writeln!(
            f,
            "V: hardware valid, H: chain head, C: cacheable, WT: write-through, CB: copy-back"
        )?;
        writeln!(f, "UC: uncached, B: buffered, UB: unbuffered")?;
        writeln!(f)?;
        writeln!(
            f,
            "slot  state  vpn         ppn         size    cache  buf  link"
        )?;

        for (index, entry) in entries.iter().enumerate() {
            let slot = SlotIndex::new(index);
            let (address, data) = self.table.registers().read_slot(slot);
            let valid = if address.is_valid() && data.is_valid() {
                'V'
            } else {
                '-'
            };

            if !live.test(slot) {
                writeln!(
                    f,
                    "  {}  {}      ----------  ----------  ------  -----  ---  --",
                    slot, valid
                )?;
                continue;
            }

            let head = if heads.test(slot) { 'H' } else { ' ' };
            writeln!(
                f,
                "  {}  {} {}    {}  {}  {:<6}  {:<5}  {:<3}  {}",
                slot,
                valid,
                head,
                entry.virtual_page_number(),
                entry.physical_page_number(),
                entry.size_class(),
                entry.flags().label(),
                if entry.flags().is_unbuffered() { "UB" } else { "B" },
                Link(entry.link()),
            )?;
        }

        Ok(())
    }
}

struct Link(Option<SlotIndex>);

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(next) => write!(f, "{}", next),
            None => f.write_str("--"),
        }
    }
}
