use clap::Parser;
use log::LevelFilter;

use pmb::{
    CacheMode, EmulatedRegisters, EntryFlags, MAX_MEMORY_REGIONS, MAX_SLOTS, MemoryRegion,
    PhysicalAddress, RemapTable, SlotIndex, SlotRegisters, TableConfig, VirtualAddress,
};

mod console;
mod request;

use console::Console;
use request::{BootSlot, MemoryArg, RemapRequest};

#[derive(Parser)]
#[command(name = "pmbsim")]
#[command(about = "Run the mapping buffer against an emulated register file")]
struct Args {
    /// Number of slots in the emulated table
    #[arg(long, default_value_t = pmb::arch::SLOT_COUNT)]
    slots: usize,

    /// System memory region as BASE:SIZE; defaults to 128M at 0x08000000
    #[arg(long = "memory", value_name = "BASE:SIZE")]
    memory: Vec<MemoryArg>,

    /// Use write-through instead of copy-back for cached mappings
    #[arg(long)]
    write_through: bool,

    /// Merge boot-time chains into larger blocks where possible
    #[arg(long)]
    coalesce: bool,

    /// Boot loader mapping preloaded into the emulated slots, in order
    #[arg(long = "boot", value_name = "VIRT=PHYS:SIZE[:uc]")]
    boot: Vec<BootSlot>,

    /// Region to map after initialization
    #[arg(long = "remap", value_name = "VIRT=PHYS:LEN[:uc]")]
    remap: Vec<RemapRequest>,

    /// Virtual base of a region to unmap, applied after every remap
    #[arg(long = "unmap", value_name = "VIRT", value_parser = parse_virtual)]
    unmap: Vec<VirtualAddress>,

    /// Wipe the emulated registers and replay the table, as after a power transition
    #[arg(long)]
    resume: bool,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    fn config(&self) -> Result<TableConfig, Box<dyn std::error::Error>> {
        if self.memory.len() > MAX_MEMORY_REGIONS {
            let message = format!("at most {} memory regions are supported", MAX_MEMORY_REGIONS);
            return Err(message.into());
        }

        let cache_mode = if self.write_through {
            CacheMode::WriteThrough
        } else {
            CacheMode::CopyBack
        };
        let mut config = TableConfig::new()
            .with_cache_mode(cache_mode)
            .with_coalescing(self.coalesce);

        if self.memory.is_empty() {
            config = config.with_memory(MemoryRegion::new(
                PhysicalAddress::new(0x0800_0000),
                128 << 20,
            ));
        }
        for MemoryArg(region) in &self.memory {
            config = config.with_memory(*region);
        }
        Ok(config)
    }
}

fn parse_virtual(text: &str) -> Result<VirtualAddress, request::ParseError> {
    let value = request::parse_number(text)?;
    if value > u32::MAX as usize {
        return Err(request::ParseError::AddressRange(value));
    }
    Ok(VirtualAddress::new(value))
}

/// Loads the boot loader's mappings, as firmware would leave them, one per slot.
fn preload(registers: &EmulatedRegisters, boot: &[BootSlot]) -> Result<(), String> {
    if boot.len() > registers.capacity() {
        return Err(format!(
            "{} boot mappings do not fit in {} slots",
            boot.len(),
            registers.capacity()
        ));
    }

    for (index, slot) in boot.iter().enumerate() {
        registers.load_mapping(
            SlotIndex::new(index),
            slot.virt,
            slot.phys,
            slot.size,
            EntryFlags::for_policy(slot.policy, CacheMode::CopyBack),
        );
    }
    Ok(())
}

/// Applies each `--remap` request in order, logging the outcome of each.
fn remap_all(table: &RemapTable<EmulatedRegisters>, requests: &[RemapRequest]) {
    for request in requests {
        // An overflowing length is rejected by remap itself.
        let requested = request.aligned_length().unwrap_or(usize::MAX);
        match table.remap(request.virt, request.phys, request.length, request.policy) {
            Ok(mapped) if mapped < requested => log::warn!(
                "remap {} -> {}: mapped {:#x} of {:#x} bytes",
                request.virt,
                request.phys,
                mapped,
                requested
            ),
            Ok(mapped) => log::info!(
                "remap {} -> {}: mapped {:#x} bytes",
                request.virt,
                request.phys,
                mapped
            ),
            Err(error) => log::error!("remap {} -> {}: {}", request.virt, request.phys, error),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    Console::init(args.log_level());

    if args.slots == 0 || args.slots > MAX_SLOTS {
        return Err(format!("slot count must be between 1 and {}", MAX_SLOTS).into());
    }

    let config = args.config()?;
    let registers = EmulatedRegisters::new(args.slots);
    preload(&registers, &args.boot)?;

    let table = RemapTable::init(registers, config);

    remap_all(&table, &args.remap);

    for &virt in &args.unmap {
        if table.unmap(virt) {
            log::info!("unmap {}: done", virt);
        } else {
            log::warn!("unmap {}: no mapping starts here", virt);
        }
    }

    if args.resume {
        table.registers().reset();
        table.resume();
    }

    print!("{}", table.dump());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmb::{CachePolicy, SizeClass};

    fn args(extra: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("pmbsim").chain(extra.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_to_one_memory_region() {
        let config = args(&[]).config().unwrap();
        assert_eq!(config.cache_mode(), CacheMode::CopyBack);
        assert!(config.is_system_memory(PhysicalAddress::new(0x0FFF_FFFF)));
        assert!(!config.is_system_memory(PhysicalAddress::new(0x1000_0000)));
    }

    #[test]
    fn maps_flags_onto_config() {
        let args = args(&[
            "--write-through",
            "--coalesce",
            "--memory",
            "0x40000000:256M",
            "--unmap",
            "0x80000000",
            "-vv",
        ]);
        let config = args.config().unwrap();
        assert_eq!(config.cache_mode(), CacheMode::WriteThrough);
        assert!(config.coalesce_boot_mappings());
        assert!(config.is_system_memory(PhysicalAddress::new(0x4000_0000)));
        assert!(!config.is_system_memory(PhysicalAddress::new(0x0800_0000)));
        assert_eq!(args.unmap, vec![VirtualAddress::new(0x8000_0000)]);
        assert_eq!(args.log_level(), LevelFilter::Trace);
    }

    #[test]
    fn preloads_boot_slots_in_order() {
        let args = args(&[
            "--boot",
            "0x80000000=0x08000000:64M",
            "--boot",
            "0xA0000000=0x08000000:16M:uc",
        ]);
        let registers = EmulatedRegisters::new(4);
        preload(&registers, &args.boot).unwrap();

        let (address, data) = registers.read_slot(SlotIndex::new(1));
        assert_eq!(address.page(), VirtualAddress::new(0xA000_0000));
        assert_eq!(data.size_class(), SizeClass::Size16M);
        assert_eq!(data.flags().policy(), CachePolicy::Uncached);
        assert_eq!(registers.write_count(), 0);

        assert!(preload(&EmulatedRegisters::new(1), &args.boot).is_err());
    }

    #[test]
    fn oversized_remaps_are_rejected_without_mapping() {
        let args = args(&[
            "--remap",
            "0x80100000=0x08100000:0xffffffffffffffff",
            "--remap",
            "0x90000000=0x08000000:16M",
        ]);
        let table = RemapTable::new(EmulatedRegisters::new(4), args.config().unwrap());
        remap_all(&table, &args.remap);

        assert_eq!(table.live_slots().count(), 1);
        assert_eq!(
            table.translate(VirtualAddress::new(0x9000_0000)),
            Some(PhysicalAddress::new(0x0800_0000))
        );
    }
}
