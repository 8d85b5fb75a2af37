//! Software emulation of the PMB register arrays for testing and host tooling.
//!
//! The emulated register file is a faithful model of the SH-4A arrays: the same word
//! formats, one address/data pair per slot, and every write immediately visible to
//! subsequent reads. It adds a few hooks real hardware lacks, such as preloading boot
//! state without counting as a write and wiping the file to simulate a power loss.

mod registers;

pub use registers::EmulatedRegisters;
